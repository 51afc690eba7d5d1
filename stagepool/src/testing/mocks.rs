//! Mock workers for testing.
//!
//! Every mock is `Clone` and clones share their counters, so a test can keep
//! one clone while the pool owns another.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::pool::Worker;

/// A worker that returns its job unchanged and records what it saw.
#[derive(Debug)]
pub struct RecordingWorker<J> {
    seen: Arc<Mutex<Vec<J>>>,
}

impl<J> RecordingWorker<J> {
    /// Creates a new recording worker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns the number of times the worker was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.seen.lock().len()
    }
}

impl<J: Clone> RecordingWorker<J> {
    /// Returns the jobs seen, in call order.
    #[must_use]
    pub fn recorded_jobs(&self) -> Vec<J> {
        self.seen.lock().clone()
    }
}

impl<J> Default for RecordingWorker<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J> Clone for RecordingWorker<J> {
    fn clone(&self) -> Self {
        Self {
            seen: self.seen.clone(),
        }
    }
}

#[async_trait]
impl<J> Worker<J, J> for RecordingWorker<J>
where
    J: Clone + Send + Sync + 'static,
{
    async fn process(&self, _ctx: Context, job: J) -> anyhow::Result<J> {
        self.seen.lock().push(job.clone());
        Ok(job)
    }
}

/// A worker that always fails.
#[derive(Debug, Clone)]
pub struct FailingWorker {
    error: String,
    call_count: Arc<Mutex<usize>>,
}

impl FailingWorker {
    /// Creates a worker failing with `error`.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns the number of times the worker was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl<J, R> Worker<J, R> for FailingWorker
where
    J: Send + 'static,
    R: Send + 'static,
{
    async fn process(&self, _ctx: Context, _job: J) -> anyhow::Result<R> {
        *self.call_count.lock() += 1;
        Err(anyhow::anyhow!("{}", self.error))
    }
}

/// A worker that fails the first `failures` attempts at each job, then
/// returns the job unchanged.
#[derive(Debug)]
pub struct FlakyWorker<J> {
    failures: u32,
    attempts: Arc<Mutex<HashMap<J, u32>>>,
}

impl<J> FlakyWorker<J>
where
    J: Hash + Eq,
{
    /// Creates a worker failing `failures` times per job.
    #[must_use]
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the number of attempts made at `job`.
    #[must_use]
    pub fn attempts(&self, job: &J) -> u32 {
        self.attempts.lock().get(job).copied().unwrap_or(0)
    }

    /// Returns the number of attempts across all jobs.
    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().values().sum()
    }
}

impl<J> Clone for FlakyWorker<J> {
    fn clone(&self) -> Self {
        Self {
            failures: self.failures,
            attempts: self.attempts.clone(),
        }
    }
}

#[async_trait]
impl<J> Worker<J, J> for FlakyWorker<J>
where
    J: Hash + Eq + Clone + Send + Sync + 'static,
{
    async fn process(&self, _ctx: Context, job: J) -> anyhow::Result<J> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(job.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if attempt <= self.failures {
            anyhow::bail!("transient failure {attempt}/{}", self.failures);
        }
        Ok(job)
    }
}

/// A worker that always panics.
#[derive(Debug, Clone)]
pub struct PanicWorker {
    message: String,
    call_count: Arc<Mutex<usize>>,
}

impl PanicWorker {
    /// Creates a worker panicking with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns the number of times the worker was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl<J, R> Worker<J, R> for PanicWorker
where
    J: Send + 'static,
    R: Send + 'static,
{
    async fn process(&self, _ctx: Context, _job: J) -> anyhow::Result<R> {
        *self.call_count.lock() += 1;
        panic!("{}", self.message);
    }
}

/// A worker that sleeps before returning its job unchanged.
#[derive(Debug, Clone)]
pub struct SlowWorker {
    delay: Duration,
}

impl SlowWorker {
    /// Creates a worker sleeping `delay` per job.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl<J> Worker<J, J> for SlowWorker
where
    J: Send + 'static,
{
    async fn process(&self, _ctx: Context, job: J) -> anyhow::Result<J> {
        tokio::time::sleep(self.delay).await;
        Ok(job)
    }
}
