//! Worker supervision for a single stage.
//!
//! Every worker of a stage shares one job receiver and owns a clone of the
//! stage's result sender. The sender lives in an [`ExitGuard`] whose `Drop`
//! decrements the live-worker count and releases the sender under the same
//! lock, on every exit path including a panic escaping the worker task. The
//! result channel therefore closes exactly once, when the last surviving
//! worker of the stage exits.

use super::config::{StageSettings, StageSpec};
use super::ledger::JobLedger;
use super::retry::RetryState;
use super::worker::{invoke, Worker};
use crate::context::Context;
use crate::errors::{JobError, JobFailure};
use crate::observability::{StageMetrics, StageMetricsSnapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

/// Shared job receiver; workers take turns pulling from it.
type SharedJobs<J> = Arc<AsyncMutex<mpsc::Receiver<J>>>;

/// State of one stage observable after it started.
#[derive(Debug)]
pub(crate) struct StageState {
    index: usize,
    size: usize,
    running: Mutex<usize>,
    ledger: JobLedger,
    metrics: StageMetrics,
}

impl StageState {
    fn new(index: usize, size: usize) -> Self {
        Self {
            index,
            size,
            running: Mutex::new(size),
            ledger: JobLedger::new(),
            metrics: StageMetrics::default(),
        }
    }

    /// Returns the number of workers that have not exited.
    pub(crate) fn running(&self) -> usize {
        *self.running.lock()
    }

    /// Returns the failures recorded so far.
    pub(crate) fn errors(&self) -> Vec<JobError> {
        self.ledger.snapshot()
    }

    /// Returns a copy of the stage counters.
    pub(crate) fn metrics(&self) -> StageMetricsSnapshot {
        self.metrics.snapshot(self.index, self.size, self.running())
    }
}

/// Per-worker exit bookkeeping.
///
/// Dropped when the worker task ends, whether it returns or panics. A guard
/// dropped before `finish` was called belongs to a worker that terminated
/// abnormally.
struct ExitGuard<R> {
    stage: Arc<StageState>,
    worker: usize,
    results: Option<mpsc::Sender<R>>,
    finished: bool,
}

impl<R> ExitGuard<R> {
    fn finish(&mut self) {
        self.finished = true;
    }

    /// Sends a result downstream, waiting while the channel is full.
    ///
    /// Returns false once the downstream receiver is gone.
    async fn send(&self, result: R) -> bool {
        match &self.results {
            Some(results) => results.send(result).await.is_ok(),
            None => false,
        }
    }
}

impl<R> Drop for ExitGuard<R> {
    fn drop(&mut self) {
        if !self.finished {
            self.stage.metrics.record_abnormal_exit();
            warn!(
                stage = self.stage.index,
                worker = self.worker,
                "Worker terminated abnormally"
            );
        }

        let mut running = self.stage.running.lock();
        *running -= 1;
        // Released under the lock so the final decrement and the close are one step.
        drop(self.results.take());
        if *running == 0 {
            debug!(stage = self.stage.index, "Last worker exited, results closed");
        }
    }
}

/// Starts the workers of one stage and returns its state and result channel.
pub(crate) fn spawn_stage<J, R>(
    runtime: &Handle,
    pool_id: Uuid,
    index: usize,
    ctx: &Context,
    spec: StageSpec<J, R>,
    jobs: mpsc::Receiver<J>,
) -> (Arc<StageState>, mpsc::Receiver<R>)
where
    J: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    let StageSpec { settings, worker } = spec;
    let state = Arc::new(StageState::new(index, settings.size));
    let (results_tx, results_rx) = mpsc::channel(settings.result_queue_limit);
    let jobs: SharedJobs<J> = Arc::new(AsyncMutex::new(jobs));
    let settings = Arc::new(settings);

    for worker_index in 0..settings.size {
        let guard = ExitGuard {
            stage: state.clone(),
            worker: worker_index,
            results: Some(results_tx.clone()),
            finished: false,
        };
        let span = info_span!("stage_worker", pool = %pool_id, stage = index, worker = worker_index);
        let task = run_worker(
            guard,
            ctx.clone(),
            jobs.clone(),
            worker.clone(),
            settings.clone(),
        );
        runtime.spawn(task.instrument(span));
    }

    debug!(
        pool = %pool_id,
        stage = index,
        size = settings.size,
        job_queue_limit = settings.job_queue_limit,
        result_queue_limit = settings.result_queue_limit,
        max_retry = settings.max_retry,
        "Stage started"
    );

    (state, results_rx)
}

async fn next_job<J>(jobs: &SharedJobs<J>) -> Option<J> {
    jobs.lock().await.recv().await
}

async fn run_worker<J, R>(
    mut guard: ExitGuard<R>,
    ctx: Context,
    jobs: SharedJobs<J>,
    worker: Arc<dyn Worker<J, R>>,
    settings: Arc<StageSettings>,
) where
    J: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    let stage = guard.stage.clone();
    debug!("Worker started");

    loop {
        let job = tokio::select! {
            biased;
            () = ctx.cancelled() => {
                debug!(reason = ?ctx.reason(), "Context cancelled, worker exiting");
                break;
            }
            job = next_job(&jobs) => match job {
                Some(job) => job,
                None => {
                    debug!("Job queue closed, worker exiting");
                    break;
                }
            },
        };

        let Some(result) = process_job(&stage, &ctx, worker.as_ref(), &settings, job).await else {
            continue;
        };

        if !guard.send(result).await {
            debug!("Result receiver dropped, worker exiting");
            break;
        }
        stage.metrics.record_completed();
    }

    guard.finish();
}

/// Runs every attempt for one job, recording it in the ledger if all fail.
async fn process_job<J, R>(
    stage: &StageState,
    ctx: &Context,
    worker: &dyn Worker<J, R>,
    settings: &StageSettings,
    job: J,
) -> Option<R>
where
    J: Clone + Send + Sync + 'static,
{
    let mut retry = RetryState::new(settings.max_retry);

    loop {
        let attempt = retry.begin_attempt();
        let failure = match invoke(worker, ctx.clone(), job.clone(), settings.recover_panic).await {
            Ok(result) => return Some(result),
            Err(failure) => failure,
        };

        if let JobFailure::Panic(message) = &failure {
            stage.metrics.record_recovered_panic();
            warn!(attempt, panic = %message, "Recovered worker panic");
        }

        if retry.can_retry() {
            let delay = settings.backoff.delay(retry.retries_used() + 1);
            if delay.is_zero() {
                stage.metrics.record_retry();
                debug!(attempt, error = %failure, "Attempt failed, retrying");
                continue;
            }

            debug!(attempt, error = %failure, ?delay, "Attempt failed, retrying after backoff");
            let cancelled = tokio::select! {
                biased;
                () = ctx.cancelled() => true,
                () = tokio::time::sleep(delay) => false,
            };
            if !cancelled {
                stage.metrics.record_retry();
                continue;
            }
            debug!(attempt, "Context cancelled during backoff, giving up on job");
        }

        give_up(stage, job, failure, attempt);
        return None;
    }
}

/// Records a job whose attempts are over in the stage ledger.
fn give_up<J>(stage: &StageState, job: J, failure: JobFailure, attempts: u32)
where
    J: Send + Sync + 'static,
{
    warn!(attempts, error = %failure, "Job failed permanently");
    stage.metrics.record_failed();
    stage
        .ledger
        .record(JobError::new(stage.index, job, failure, attempts));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::config::Config;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn spec<J, R>(config: Config<J, R>) -> StageSpec<J, R> {
        config.into_spec().expect("valid config")
    }

    #[tokio::test]
    async fn test_stage_closes_results_after_jobs_close() {
        let (tx, rx) = mpsc::channel(4);
        let config = Config::with_defaults(3, |_ctx: Context, job: u32| async move {
            anyhow::Ok(job + 1)
        });

        let (state, mut results) =
            spawn_stage(&Handle::current(), Uuid::new_v4(), 0, &Context::new(), spec(config), rx);
        for job in 0..4 {
            tx.send(job).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(result) = results.recv().await {
            seen.push(result);
        }
        seen.sort_unstable();

        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(state.running(), 0);
        assert_eq!(state.metrics().completed, 4);
    }

    #[tokio::test]
    async fn test_unrecovered_panic_still_decrements_running() {
        let (tx, rx) = mpsc::channel(4);
        let config = Config::with_defaults(2, |_ctx: Context, job: u32| async move {
            if job == 0 {
                panic!("fatal job");
            }
            anyhow::Ok(job)
        });

        let (state, mut results) =
            spawn_stage(&Handle::current(), Uuid::new_v4(), 0, &Context::new(), spec(config), rx);
        tx.send(0).await.unwrap();
        tx.send(1).await.unwrap();
        drop(tx);

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            let mut seen = Vec::new();
            while let Some(result) = results.recv().await {
                seen.push(result);
            }
            seen
        })
        .await
        .expect("results should close");

        assert_eq!(drained, vec![1]);
        assert_eq!(state.running(), 0);
        assert!(state.errors().is_empty());
        assert_eq!(state.metrics().abnormal_exits, 1);
    }

    #[tokio::test]
    async fn test_retries_then_records_failure() {
        let (tx, rx) = mpsc::channel(1);
        let config = Config::with_defaults(1, |_ctx: Context, _job: u32| async move {
            Err::<u32, _>(anyhow::anyhow!("always"))
        })
        .with_max_retry(2);

        let (state, mut results) =
            spawn_stage(&Handle::current(), Uuid::new_v4(), 3, &Context::new(), spec(config), rx);
        tx.send(9).await.unwrap();
        drop(tx);

        assert!(results.recv().await.is_none());
        let errors = state.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, 3);
        assert_eq!(errors[0].attempts, 3);
        assert_eq!(errors[0].job::<u32>(), Some(&9));
        assert_eq!(state.metrics().retries, 2);
    }
}
