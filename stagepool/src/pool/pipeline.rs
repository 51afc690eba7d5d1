//! The pool handle exposed to callers.

use super::builder::PoolBuilder;
use super::config::Config;
use super::results::Results;
use super::stage::StageState;
use crate::context::Context;
use crate::errors::{JobError, PoolError};
use crate::observability::StageMetricsSnapshot;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// A started chain of one or more stages, from jobs `J` to results `R`.
///
/// Jobs go in through [`send_jobs`](Pool::send_jobs); [`close`](Pool::close)
/// stops submission and hands back the final stage's [`Results`]. Closing
/// cascades: each stage's output closes when its last worker exits, which
/// ends the next stage's input.
///
/// Results are only readable after `close`, so until then they wait in the
/// final stage's result queue; once it fills, submission blocks.
///
/// Failed jobs never reach the next stage. After the results are drained,
/// [`errors`](Pool::errors) lists them, stage 0 first.
pub struct Pool<J, R> {
    id: Uuid,
    ctx: Context,
    jobs: Mutex<Option<mpsc::Sender<J>>>,
    results: Mutex<Option<mpsc::Receiver<R>>>,
    stages: Vec<Arc<StageState>>,
}

impl<J, R> Pool<J, R>
where
    J: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    /// Creates and starts a single-stage pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the configuration is invalid
    /// and [`PoolError::NoRuntime`] outside a Tokio runtime.
    pub fn new(ctx: Context, config: Config<J, R>) -> Result<Self, PoolError> {
        PoolBuilder::new(ctx).stage(config).build()
    }
}

impl<J> Pool<J, J>
where
    J: Send + 'static,
{
    /// Starts building a multi-stage pool whose first stage consumes `J`.
    #[must_use]
    pub fn builder(ctx: Context) -> PoolBuilder<J, J> {
        PoolBuilder::new(ctx)
    }
}

impl<J, R> Pool<J, R> {
    pub(crate) fn from_parts(
        id: Uuid,
        ctx: Context,
        jobs: mpsc::Sender<J>,
        results: mpsc::Receiver<R>,
        stages: Vec<Arc<StageState>>,
    ) -> Self {
        Self {
            id,
            ctx,
            jobs: Mutex::new(Some(jobs)),
            results: Mutex::new(Some(results)),
            stages,
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<J>, PoolError> {
        self.jobs.lock().clone().ok_or(PoolError::Closed)
    }

    /// Submits one job, waiting while the first stage's queue is full.
    ///
    /// # Errors
    ///
    /// [`PoolError::Closed`] after [`close`](Pool::close), and
    /// [`PoolError::Stopped`] once every first-stage worker has exited.
    pub async fn send_job(&self, job: J) -> Result<(), PoolError> {
        let sender = self.sender()?;
        sender.send(job).await.map_err(|_| PoolError::Stopped)
    }

    /// Submits jobs in iteration order, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Same as [`send_job`](Pool::send_job); jobs before the failing one
    /// were submitted. A [`close`](Pool::close) while this call waits stops
    /// it before the next job with [`PoolError::Closed`].
    pub async fn send_jobs<I>(&self, jobs: I) -> Result<(), PoolError>
    where
        I: IntoIterator<Item = J>,
    {
        let sender = self.sender()?;
        for job in jobs {
            if self.is_closed() {
                return Err(PoolError::Closed);
            }
            sender.send(job).await.map_err(|_| PoolError::Stopped)?;
        }
        Ok(())
    }

    /// Stops job submission and returns the final stage's results.
    ///
    /// The caller should drain the returned stream to the end; that is what
    /// guarantees all workers exited and all failures were recorded. A
    /// `send_jobs` call already in flight delivers at most the job it is
    /// waiting on, then returns [`PoolError::Closed`].
    ///
    /// # Errors
    ///
    /// [`PoolError::Closed`] if the pool was already closed.
    pub fn close(&self) -> Result<Results<R>, PoolError> {
        let jobs = self.jobs.lock().take().ok_or(PoolError::Closed)?;
        drop(jobs);
        let results = self.results.lock().take().ok_or(PoolError::Closed)?;
        debug!(pool = %self.id, "Pool closed to new jobs");
        Ok(Results::new(results))
    }

    /// Returns true once [`close`](Pool::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.jobs.lock().is_none()
    }

    /// Returns every failed job, stage 0 first.
    ///
    /// Complete only after the results were drained; before that, entries
    /// may still be appended.
    #[must_use]
    pub fn errors(&self) -> Vec<JobError> {
        self.stages.iter().flat_map(|stage| stage.errors()).collect()
    }

    /// Returns the number of live workers across all stages.
    #[must_use]
    pub fn running(&self) -> usize {
        self.stages.iter().map(|stage| stage.running()).sum()
    }

    /// Returns the number of live workers of one stage.
    #[must_use]
    pub fn stage_running(&self, stage: usize) -> Option<usize> {
        self.stages.get(stage).map(|stage| stage.running())
    }

    /// Returns per-stage counters, stage 0 first.
    #[must_use]
    pub fn metrics(&self) -> Vec<StageMetricsSnapshot> {
        self.stages.iter().map(|stage| stage.metrics()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the context shared by every worker.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Returns the pool id used in log output.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<J, R> fmt::Debug for Pool<J, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("stages", &self.stages.len())
            .field("running", &self.running())
            .field("closed", &self.is_closed())
            .finish()
    }
}
