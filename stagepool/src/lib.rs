//! # Stagepool
//!
//! Bounded async worker pools, chained into typed multi-stage pipelines.
//!
//! A stage runs a fixed number of workers that pull jobs from a bounded
//! channel, apply a user-supplied [`Worker`](pool::Worker) and push results
//! into another bounded channel. Stages are chained so that one stage's
//! results are the next stage's jobs:
//!
//! - **Backpressure**: full channels block producers, up to the caller
//! - **Retries**: failed attempts are retried immediately up to `max_retry`
//! - **Failure isolation**: permanently failed jobs land in a ledger, panics
//!   can be recovered, and a worker dying never stalls shutdown
//! - **Cascading shutdown**: closing the pool drains every stage in order
//! - **Cancellation**: a shared [`Context`](context::Context) stops all workers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagepool::prelude::*;
//!
//! let pool = Pool::builder(Context::new())
//!     .stage(Config::with_defaults(5, |_ctx, job: u32| async move { anyhow::Ok(job * 2) }))
//!     .stage(Config::with_defaults(2, |_ctx, n: u32| async move { anyhow::Ok(n.to_string()) }))
//!     .build()?;
//!
//! pool.send_jobs(1..=10).await?;
//! let results = pool.close()?.drain().await;
//! let failed = pool.errors();
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod errors;
pub mod observability;
pub mod pool;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{CancellationToken, Context};
    pub use crate::errors::{ConfigError, JobError, JobFailure, PoolError};
    pub use crate::observability::{init_tracing, LogFormat, StageMetricsSnapshot};
    pub use crate::pool::{
        Config, Pool, PoolBuilder, Results, RetryBackoff, StageSettings, Worker,
    };
}
