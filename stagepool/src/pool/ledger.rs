//! The per-stage ledger of permanently failed jobs.

use crate::errors::JobError;
use parking_lot::Mutex;

/// An append-only, lock-protected list of [`JobError`]s.
///
/// Entries keep the order in which workers recorded them.
#[derive(Debug, Default)]
pub struct JobLedger {
    entries: Mutex<Vec<JobError>>,
}

impl JobLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a failed job.
    pub fn record(&self, error: JobError) {
        self.entries.lock().push(error);
    }

    /// Returns a copy of the recorded failures.
    #[must_use]
    pub fn snapshot(&self) -> Vec<JobError> {
        self.entries.lock().clone()
    }

    /// Returns the number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::JobFailure;
    use std::sync::Arc;

    #[test]
    fn test_record_keeps_order() {
        let ledger = JobLedger::new();
        assert!(ledger.is_empty());

        ledger.record(JobError::new(0, 1_u32, JobFailure::Panic("a".into()), 1));
        ledger.record(JobError::new(0, 2_u32, JobFailure::Panic("b".into()), 1));

        let jobs: Vec<u32> = ledger
            .snapshot()
            .iter()
            .filter_map(|e| e.job::<u32>().copied())
            .collect();
        assert_eq!(jobs, vec![1, 2]);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let ledger = Arc::new(JobLedger::new());

        let handles: Vec<_> = (0..8_u32)
            .map(|t| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for i in 0..100_u32 {
                        ledger.record(JobError::new(0, t * 100 + i, JobFailure::Panic(String::new()), 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut jobs: Vec<u32> = ledger
            .snapshot()
            .iter()
            .filter_map(|e| e.job::<u32>().copied())
            .collect();
        jobs.sort_unstable();
        assert_eq!(jobs, (0..800).collect::<Vec<_>>());
    }
}
