//! Observability utilities.

mod logging;
mod metrics;

pub use logging::{init_tracing, LogFormat};
pub use metrics::{StageMetrics, StageMetricsSnapshot};
