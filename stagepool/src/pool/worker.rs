//! The worker capability and its supervised invocation.

use crate::context::Context;
use crate::errors::JobFailure;
use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Trait for the transformation a stage applies to each job.
///
/// `process` is called once per attempt. Returning an error makes the attempt
/// retryable; panicking is an abnormal termination, recovered only when the
/// stage is configured to recover panics.
///
/// Any `Fn(Context, J) -> impl Future<Output = anyhow::Result<R>>` is a worker.
#[async_trait]
pub trait Worker<J, R>: Send + Sync {
    /// Processes one job.
    async fn process(&self, ctx: Context, job: J) -> anyhow::Result<R>;
}

#[async_trait]
impl<J, R, F, Fut> Worker<J, R> for F
where
    F: Fn(Context, J) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    J: Send + 'static,
    R: Send + 'static,
{
    async fn process(&self, ctx: Context, job: J) -> anyhow::Result<R> {
        (self)(ctx, job).await
    }
}

/// Runs one attempt, optionally converting a panic into a [`JobFailure`].
///
/// Without recovery a panic unwinds out of the calling task.
pub(crate) async fn invoke<J, R>(
    worker: &dyn Worker<J, R>,
    ctx: Context,
    job: J,
    recover_panic: bool,
) -> Result<R, JobFailure> {
    if !recover_panic {
        return worker.process(ctx, job).await.map_err(JobFailure::from);
    }

    match AssertUnwindSafe(worker.process(ctx, job)).catch_unwind().await {
        Ok(result) => result.map_err(JobFailure::from),
        Err(payload) => Err(JobFailure::from_panic(payload.as_ref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Doubler;

    #[async_trait]
    impl Worker<u32, u32> for Doubler {
        async fn process(&self, _ctx: Context, job: u32) -> anyhow::Result<u32> {
            Ok(job * 2)
        }
    }

    #[tokio::test]
    async fn test_struct_worker() {
        let result = invoke::<u32, u32>(&Doubler, Context::new(), 21, false).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_closure_worker_sees_context() {
        let worker = |ctx: Context, job: u32| async move {
            let suffix: String = ctx.value_as("suffix").unwrap_or_default();
            anyhow::Ok(format!("{job}{suffix}"))
        };
        let ctx = Context::new().with_value("suffix", "!");

        let result = invoke::<u32, String>(&worker, ctx, 7, false).await;
        assert_eq!(result.unwrap(), "7!");
    }

    #[tokio::test]
    async fn test_error_becomes_failure() {
        let worker = |_ctx: Context, _job: u32| async move {
            Err::<u32, _>(anyhow::anyhow!("some-error"))
        };

        let failure = invoke::<u32, u32>(&worker, Context::new(), 1, false).await.unwrap_err();
        assert!(!failure.is_panic());
        assert_eq!(failure.to_string(), "some-error");
    }

    #[tokio::test]
    async fn test_panic_recovered() {
        let worker = |_ctx: Context, job: u32| async move {
            if job > 0 {
                panic!("random panic {job}");
            }
            anyhow::Ok(job)
        };

        let failure = invoke::<u32, u32>(&worker, Context::new(), 3, true).await.unwrap_err();
        assert!(failure.is_panic());
        assert_eq!(failure.to_string(), "worker panicked: random panic 3");
    }
}
