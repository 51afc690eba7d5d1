//! Error types for stagepool.
//!
//! Construction problems surface synchronously as [`PoolError`]. Per-job
//! failures never escape a stage: they are recorded as [`JobError`]s in the
//! stage ledger and read back through `Pool::errors`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A rule violated by a stage configuration.
///
/// Rules are checked in declaration order and the first violation wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The stage has no workers.
    #[error("expected pool size to be more than 0")]
    ZeroSize,

    /// The job channel has no capacity.
    #[error("expected job queue limit to be more than 0")]
    ZeroJobQueueLimit,

    /// The result channel has no capacity.
    #[error("expected result queue limit to be more than 0")]
    ZeroResultQueueLimit,

    /// No worker capability was supplied.
    #[error("expected worker to be set")]
    MissingWorker,
}

/// The main error type for pool construction and submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// A stage configuration failed validation; nothing was started.
    #[error("invalid configuration for stage {stage}: {source}")]
    InvalidConfig {
        /// Zero-based index of the offending stage.
        stage: usize,
        /// The violated rule.
        #[source]
        source: ConfigError,
    },

    /// The builder was asked to build a pool without any stage.
    #[error("pipeline has no stages")]
    EmptyPipeline,

    /// The pool was built outside of a Tokio runtime.
    #[error("no tokio runtime available to spawn workers")]
    NoRuntime,

    /// `close` was already called.
    #[error("pool is closed to new jobs")]
    Closed,

    /// Every worker of the first stage has exited, usually after cancellation.
    #[error("pool workers have stopped")]
    Stopped,
}

impl PoolError {
    /// Returns the violated rule when this is a configuration error.
    #[must_use]
    pub fn config_error(&self) -> Option<ConfigError> {
        match self {
            Self::InvalidConfig { source, .. } => Some(*source),
            _ => None,
        }
    }
}

/// Why a single attempt at a job failed.
#[derive(Debug, Clone, Error)]
pub enum JobFailure {
    /// The worker returned an error.
    #[error("{0}")]
    Error(Arc<anyhow::Error>),

    /// The worker panicked and the stage recovers panics.
    #[error("worker panicked: {0}")]
    Panic(String),
}

impl JobFailure {
    /// Returns true if the failure came from a recovered panic.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }

    /// Builds a failure from a panic payload.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panic(message)
    }
}

impl From<anyhow::Error> for JobFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::Error(Arc::new(err))
    }
}

/// A job that a stage gave up on.
///
/// The job is stored type-erased so that ledgers of stages with different job
/// types can be concatenated; use [`JobError::job`] with the stage's job type
/// to get it back.
#[derive(Clone, Error)]
#[error("stage {stage}: job failed after {attempts} attempt(s): {error}")]
pub struct JobError {
    /// Zero-based index of the stage that recorded the failure.
    pub stage: usize,
    /// Number of attempts made, including the first.
    pub attempts: u32,
    /// The failure of the last attempt.
    pub error: JobFailure,
    job: Arc<dyn Any + Send + Sync>,
}

impl JobError {
    /// Creates a new job error.
    pub fn new<J>(stage: usize, job: J, error: JobFailure, attempts: u32) -> Self
    where
        J: Send + Sync + 'static,
    {
        Self {
            stage,
            attempts,
            error,
            job: Arc::new(job),
        }
    }

    /// Returns the failed job if it is of type `J`.
    #[must_use]
    pub fn job<J: 'static>(&self) -> Option<&J> {
        self.job.downcast_ref::<J>()
    }
}

impl fmt::Debug for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobError")
            .field("stage", &self.stage)
            .field("attempts", &self.attempts)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_error_messages_are_distinct() {
        let messages = [
            ConfigError::ZeroSize,
            ConfigError::ZeroJobQueueLimit,
            ConfigError::ZeroResultQueueLimit,
            ConfigError::MissingWorker,
        ]
        .map(|e| e.to_string());

        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_invalid_config_display() {
        let err = PoolError::InvalidConfig {
            stage: 2,
            source: ConfigError::ZeroSize,
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration for stage 2: expected pool size to be more than 0"
        );
        assert_eq!(err.config_error(), Some(ConfigError::ZeroSize));
        assert_eq!(PoolError::Closed.config_error(), None);
    }

    #[test]
    fn test_panic_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(JobFailure::from_panic(boxed.as_ref()).to_string(), "worker panicked: static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert!(JobFailure::from_panic(boxed.as_ref()).is_panic());

        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(
            JobFailure::from_panic(boxed.as_ref()).to_string(),
            "worker panicked: unknown panic payload"
        );
    }

    #[test]
    fn test_job_error_downcast() {
        let err = JobError::new(0, 7_u32, anyhow::anyhow!("boom").into(), 3);

        assert_eq!(err.job::<u32>(), Some(&7));
        assert_eq!(err.job::<String>(), None);
        assert_eq!(err.to_string(), "stage 0: job failed after 3 attempt(s): boom");
        assert!(!err.error.is_panic());
    }
}
