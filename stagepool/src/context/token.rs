//! One-shot cancellation signal shared by the workers of a pool.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::warn;

/// Hook run once when a token is cancelled.
pub type CancelCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Signal {
    reason: Option<String>,
    hooks: Vec<CancelCallback>,
}

/// A one-shot cancellation signal.
///
/// The first `cancel` sets the reason and fires; later calls are no-ops.
/// Async code waits on [`cancelled`](CancellationToken::cancelled), sync code
/// polls [`is_cancelled`](CancellationToken::is_cancelled) or registers a hook.
#[derive(Default)]
pub struct CancellationToken {
    fired: AtomicBool,
    signal: Mutex<Signal>,
    waiters: Notify,
}

fn run_hook(hook: CancelCallback) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(hook)) {
        warn!(?payload, "Cancel hook panicked");
    }
}

impl CancellationToken {
    /// Creates a token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token with `reason`.
    ///
    /// Returns false if it had already fired. Hooks run on the calling thread
    /// after waiters are woken; a panicking hook is logged and skipped.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let hooks = {
            let mut signal = self.signal.lock();
            if self.fired.swap(true, Ordering::AcqRel) {
                return false;
            }
            signal.reason = Some(reason.into());
            std::mem::take(&mut signal.hooks)
        };

        self.waiters.notify_waiters();
        hooks.into_iter().for_each(run_hook);
        true
    }

    /// Registers `hook` to run when the token fires, or runs it now if the
    /// token already has.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut signal = self.signal.lock();
        if !self.is_cancelled() {
            signal.hooks.push(Box::new(hook));
            return;
        }
        drop(signal);
        run_hook(Box::new(hook));
    }

    /// Returns true once the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Returns the reason given to the first `cancel`.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.signal.lock().reason.clone()
    }

    /// Resolves once the token has fired.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.waiters.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let signal = self.signal.lock();
        f.debug_struct("CancellationToken")
            .field("fired", &self.is_cancelled())
            .field("reason", &signal.reason)
            .field("pending_hooks", &signal.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_hook(hits: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let hits = hits.clone();
        move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fresh_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);
    }

    #[test]
    fn test_first_reason_kept() {
        let token = CancellationToken::new();

        assert!(token.cancel("shutdown"));
        assert!(!token.cancel("deadline exceeded"));
        assert_eq!(token.reason().as_deref(), Some("shutdown"));
    }

    #[test]
    fn test_hooks_fire_once() {
        let token = CancellationToken::new();
        let hits = Arc::new(AtomicUsize::new(0));
        token.on_cancel(counting_hook(&hits));
        token.on_cancel(counting_hook(&hits));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        token.cancel("a");
        token.cancel("b");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_late_hook_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel("done");

        let hits = Arc::new(AtomicUsize::new(0));
        token.on_cancel(counting_hook(&hits));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_hook_does_not_block_others() {
        let token = CancellationToken::new();
        let hits = Arc::new(AtomicUsize::new(0));
        token.on_cancel(|| panic!("hook failure"));
        token.on_cancel(counting_hook(&hits));

        assert!(token.cancel("stop"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiters_woken_on_cancel() {
        let token = Arc::new(CancellationToken::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let token = token.clone();
                tokio::spawn(async move { token.cancelled().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(waiters.iter().all(|w| !w.is_finished()));

        token.cancel("stop");
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter should wake")
                .expect("waiter should not panic");
        }
    }

    #[tokio::test]
    async fn test_cancelled_ready_after_fire() {
        let token = CancellationToken::new();
        token.cancel("early");
        tokio_test::assert_ready!(tokio_test::task::spawn(token.cancelled()).poll());
    }
}
