//! Processing context shared by every worker of a pool.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation
//! - Context, a cheap handle combining a token with caller-defined values

mod processing;
mod token;

pub use processing::Context;
pub use token::{CancelCallback, CancellationToken};
