//! Worker pools and their composition into pipelines.
//!
//! This module provides:
//! - Stage configuration with validation
//! - The worker capability and panic recovery
//! - Per-stage supervision, retries and the failure ledger
//! - A typed builder chaining stages into one pool

mod builder;
mod config;
mod ledger;
mod pipeline;
mod results;
mod retry;
mod stage;
mod worker;

pub use builder::PoolBuilder;
pub use config::{Config, StageSettings};
pub use ledger::JobLedger;
pub use pipeline::Pool;
pub use results::Results;
pub use retry::{RetryBackoff, RetryState};
pub use worker::Worker;
