//! Typed builder chaining stages into one pool.

use super::config::{Config, StageSpec};
use super::pipeline::Pool;
use super::stage::{spawn_stage, StageState};
use crate::context::Context;
use crate::errors::PoolError;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Deferred start of every stage added so far, fed the first job channel.
type Launch<J, R> = Box<dyn FnOnce(&mut Launcher, mpsc::Receiver<J>) -> mpsc::Receiver<R> + Send>;

/// Everything needed to start stages once the whole chain is validated.
pub(crate) struct Launcher {
    runtime: Handle,
    pool_id: Uuid,
    ctx: Context,
    stages: Vec<Arc<StageState>>,
}

impl Launcher {
    fn spawn<J, R>(&mut self, index: usize, spec: StageSpec<J, R>, jobs: mpsc::Receiver<J>) -> mpsc::Receiver<R>
    where
        J: Clone + Send + Sync + 'static,
        R: Send + 'static,
    {
        let (state, results) = spawn_stage(&self.runtime, self.pool_id, index, &self.ctx, spec, jobs);
        self.stages.push(state);
        results
    }
}

/// Builder for a pool of one or more stages.
///
/// `J` is the job type of the first stage and `R` the result type of the
/// last stage added. Each [`stage`](PoolBuilder::stage) must accept the
/// previous stage's result type, so a mismatched chain does not compile.
///
/// Configurations are validated as they are added; no worker starts before
/// [`build`](PoolBuilder::build), and nothing starts at all if any stage is
/// invalid.
///
/// ```rust,ignore
/// let pool = Pool::builder(ctx)
///     .stage(Config::with_defaults(5, parse))
///     .stage(Config::with_defaults(2, enrich))
///     .build()?;
/// ```
pub struct PoolBuilder<J, R> {
    ctx: Context,
    job_queue_limit: Option<usize>,
    stage_count: usize,
    launch: Result<Launch<J, R>, PoolError>,
}

impl<J> PoolBuilder<J, J>
where
    J: Send + 'static,
{
    /// Creates a builder without stages.
    #[must_use]
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            job_queue_limit: None,
            stage_count: 0,
            launch: Ok(Box::new(|_, jobs| jobs)),
        }
    }
}

impl<J, R> PoolBuilder<J, R>
where
    J: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Appends a stage consuming the current result type.
    ///
    /// The first stage's job queue limit sizes the pool's input channel. Only
    /// the first invalid configuration is kept.
    #[must_use]
    pub fn stage<R2>(self, config: Config<R, R2>) -> PoolBuilder<J, R2>
    where
        R2: Send + 'static,
    {
        let index = self.stage_count;
        let job_queue_limit = self
            .job_queue_limit
            .or(Some(config.settings.job_queue_limit));

        let launch = match self.launch {
            Err(e) => Err(e),
            Ok(previous) => match config.into_spec() {
                Err(source) => Err(PoolError::InvalidConfig { stage: index, source }),
                Ok(spec) => {
                    let launch: Launch<J, R2> = Box::new(move |launcher, jobs| {
                        let input = previous(launcher, jobs);
                        launcher.spawn(index, spec, input)
                    });
                    Ok(launch)
                }
            },
        };

        PoolBuilder {
            ctx: self.ctx,
            job_queue_limit,
            stage_count: index + 1,
            launch,
        }
    }
}

impl<J, R> PoolBuilder<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    /// Returns the number of stages added.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    /// Starts every stage and returns the pool.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the first stage validation error, [`PoolError::EmptyPipeline`]
    /// without stages, or [`PoolError::NoRuntime`] outside a runtime. No
    /// worker is started in any of these cases.
    pub fn build(self) -> Result<Pool<J, R>, PoolError> {
        let launch = self.launch?;
        let Some(job_queue_limit) = self.job_queue_limit else {
            return Err(PoolError::EmptyPipeline);
        };
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let pool_id = Uuid::now_v7();
        let (jobs_tx, jobs_rx) = mpsc::channel(job_queue_limit);
        let mut launcher = Launcher {
            runtime,
            pool_id,
            ctx: self.ctx.clone(),
            stages: Vec::with_capacity(self.stage_count),
        };
        let results = launch(&mut launcher, jobs_rx);

        info!(pool = %pool_id, stages = launcher.stages.len(), "Pool started");
        Ok(Pool::from_parts(pool_id, self.ctx, jobs_tx, results, launcher.stages))
    }
}

impl<J, R> fmt::Debug for PoolBuilder<J, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("stage_count", &self.stage_count)
            .field("job_queue_limit", &self.job_queue_limit)
            .field("error", &self.launch.as_ref().err())
            .finish()
    }
}
