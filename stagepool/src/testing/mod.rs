//! Testing utilities for stagepool pools.
//!
//! This module provides:
//! - Mock workers with shared call counters
//! - Assertions over results and failure ledgers
//! - Fixtures for draining with a deadline

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_exactly_once, assert_jobs_accounted_for};
pub use fixtures::{drain_within, numbered_jobs};
pub use mocks::{FailingWorker, FlakyWorker, PanicWorker, RecordingWorker, SlowWorker};
