//! The processing context handed to every worker invocation.

use super::CancellationToken;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

/// Cancellation plus caller-defined values, shared by a whole pool.
///
/// Cloning is cheap and every clone observes the same cancellation. Values are
/// an opaque pass-through for workers; the pool never reads them.
#[derive(Clone, Default)]
pub struct Context {
    token: Arc<CancellationToken>,
    values: Arc<HashMap<String, serde_json::Value>>,
}

impl Context {
    /// Creates a new, uncancelled context without values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias for [`Context::new`].
    #[must_use]
    pub fn background() -> Self {
        Self::new()
    }

    /// Returns a context carrying an additional value.
    ///
    /// An existing value under the same key is shadowed. The returned context
    /// shares cancellation with `self`.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Arc::make_mut(&mut self.values).insert(key.into(), value.into());
        self
    }

    /// Gets a value by key.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Gets a value by key and deserializes it.
    ///
    /// Returns `None` if the key is absent or the value has another shape.
    #[must_use]
    pub fn value_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the context carries no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Requests cancellation of every pool using this context.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.token.cancel(reason.clone()) {
            debug!(reason = %reason, "Context cancelled");
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.token.reason()
    }

    /// Waits until the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Derives a context that is cancelled whenever `self` is.
    ///
    /// The child keeps the parent's values and can be cancelled on its own
    /// without affecting the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        let token = Arc::new(CancellationToken::new());
        let child: Weak<CancellationToken> = Arc::downgrade(&token);
        let parent: Weak<CancellationToken> = Arc::downgrade(&self.token);

        self.token.on_cancel(move || {
            if let Some(child) = child.upgrade() {
                let reason = parent
                    .upgrade()
                    .and_then(|p| p.reason())
                    .unwrap_or_else(|| "parent cancelled".to_string());
                child.cancel(reason);
            }
        });

        Self {
            token,
            values: self.values.clone(),
        }
    }

    /// Cancels the context once `after` has elapsed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn cancel_after(&self, after: Duration) {
        let ctx = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(after) => ctx.cancel("deadline exceeded"),
                () = ctx.cancelled() => {}
            }
        });
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_values_pass_through() {
        let ctx = Context::background()
            .with_value("first", "first-value")
            .with_value("second", 2);

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.value("first"), Some(&json!("first-value")));
        assert_eq!(ctx.value_as::<i64>("second"), Some(2));
        assert_eq!(ctx.value_as::<String>("second"), None);
        assert!(ctx.value("missing").is_none());
    }

    #[test]
    fn test_with_value_shadows_without_touching_original() {
        let base = Context::new().with_value("key", 1);
        let shadowed = base.clone().with_value("key", 2);

        assert_eq!(base.value_as::<i64>("key"), Some(1));
        assert_eq!(shadowed.value_as::<i64>("key"), Some(2));
    }

    #[test]
    fn test_clones_share_cancellation() {
        let ctx = Context::new().with_value("key", 1);
        let derived = ctx.clone().with_value("other", 2);

        derived.cancel("stop");
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.reason(), Some("stop".to_string()));
    }

    #[test]
    fn test_token_hooks_see_context_cancel() {
        let ctx = Context::new();
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = fired.clone();
        ctx.token()
            .on_cancel(move || flag.store(true, std::sync::atomic::Ordering::SeqCst));

        ctx.cancel("stop");
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
        assert!(ctx.token().is_cancelled());
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = Context::new().with_value("key", "v");
        let child = parent.child();
        assert_eq!(child.value_as::<String>("key"), Some("v".to_string()));

        parent.cancel("shutdown");
        assert!(child.is_cancelled());
        assert_eq!(child.reason(), Some("shutdown".to_string()));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = Context::new();
        let child = parent.child();

        child.cancel("only me");
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_after() {
        let ctx = Context::new();
        ctx.cancel_after(Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(1), ctx.cancelled())
            .await
            .expect("deadline should cancel the context");
        assert_eq!(ctx.reason(), Some("deadline exceeded".to_string()));
    }
}
