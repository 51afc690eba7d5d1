//! Fixtures for pool tests.

use crate::pool::Results;
use std::time::Duration;

/// Drains `results`, giving up after `timeout`.
///
/// Returns `None` if the stream did not end in time, which in a test means
/// some worker never exited.
pub async fn drain_within<R>(results: Results<R>, timeout: Duration) -> Option<Vec<R>> {
    tokio::time::timeout(timeout, results.drain()).await.ok()
}

/// Returns the jobs `0..count`.
#[must_use]
pub fn numbered_jobs(count: u32) -> Vec<u32> {
    (0..count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_drain_within_times_out_on_open_stream() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        let drained = drain_within(Results::new(rx), Duration::from_millis(20)).await;
        assert!(drained.is_none());
        drop(tx);
    }

    #[test]
    fn test_numbered_jobs() {
        assert_eq!(numbered_jobs(3), vec![0, 1, 2]);
    }
}
