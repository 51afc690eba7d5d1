//! Per-stage counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the workers of one stage.
#[derive(Debug, Default)]
pub struct StageMetrics {
    /// Jobs that produced a result.
    completed: AtomicU64,
    /// Jobs recorded in the ledger.
    failed: AtomicU64,
    /// Attempts beyond the first.
    retries: AtomicU64,
    /// Panics converted into failures.
    recovered_panics: AtomicU64,
    /// Workers that exited by unwinding.
    abnormal_exits: AtomicU64,
}

impl StageMetrics {
    /// Records a job that produced a result.
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a job given up on.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a retry.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a recovered panic.
    pub fn record_recovered_panic(&self) {
        self.recovered_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a worker that unwound out of its task.
    pub fn record_abnormal_exit(&self) {
        self.abnormal_exits.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of completed jobs.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Returns the number of failed jobs.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Returns the number of retries.
    #[must_use]
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Returns the number of recovered panics.
    #[must_use]
    pub fn recovered_panics(&self) -> u64 {
        self.recovered_panics.load(Ordering::Relaxed)
    }

    /// Returns the number of abnormal worker exits.
    #[must_use]
    pub fn abnormal_exits(&self) -> u64 {
        self.abnormal_exits.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self, stage: usize, size: usize, running: usize) -> StageMetricsSnapshot {
        StageMetricsSnapshot {
            stage,
            size,
            running,
            completed: self.completed(),
            failed: self.failed(),
            retries: self.retries(),
            recovered_panics: self.recovered_panics(),
            abnormal_exits: self.abnormal_exits(),
        }
    }
}

/// A copy of one stage's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMetricsSnapshot {
    /// Zero-based stage index.
    pub stage: usize,
    /// Configured worker count.
    pub size: usize,
    /// Workers still running.
    pub running: usize,
    /// Jobs that produced a result.
    pub completed: u64,
    /// Jobs recorded in the ledger.
    pub failed: u64,
    /// Attempts beyond the first.
    pub retries: u64,
    /// Panics converted into failures.
    pub recovered_panics: u64,
    /// Workers that exited by unwinding.
    pub abnormal_exits: u64,
}

impl StageMetricsSnapshot {
    /// Converts the snapshot to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "stage": self.stage,
            "size": self.size,
            "running": self.running,
            "completed": self.completed,
            "failed": self.failed,
            "retries": self.retries,
            "recovered_panics": self.recovered_panics,
            "abnormal_exits": self.abnormal_exits,
        })
    }
}
