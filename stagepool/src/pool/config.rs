//! Stage configuration and validation.

use super::retry::RetryBackoff;
use super::worker::Worker;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The tunable, serializable part of a stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSettings {
    /// Number of concurrent workers.
    pub size: usize,
    /// Capacity of the job channel feeding the stage.
    #[serde(default)]
    pub job_queue_limit: usize,
    /// Capacity of the result channel the stage produces into.
    #[serde(default)]
    pub result_queue_limit: usize,
    /// Retries allowed after the first failed attempt.
    #[serde(default)]
    pub max_retry: u32,
    /// Whether a panicking worker invocation becomes a retryable failure.
    #[serde(default)]
    pub recover_panic: bool,
    /// Delay between retries.
    #[serde(default)]
    pub backoff: RetryBackoff,
}

/// Settings as written in JSON, before size-based defaults are applied.
#[derive(Deserialize)]
struct RawStageSettings {
    size: usize,
    job_queue_limit: Option<usize>,
    result_queue_limit: Option<usize>,
    #[serde(default)]
    max_retry: u32,
    #[serde(default)]
    recover_panic: bool,
    #[serde(default)]
    backoff: RetryBackoff,
}

impl StageSettings {
    /// Creates settings with queue limits equal to `size` and no retries.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            job_queue_limit: size,
            result_queue_limit: size,
            max_retry: 0,
            recover_panic: false,
            backoff: RetryBackoff::Immediate,
        }
    }

    /// Parses settings from JSON.
    ///
    /// Missing queue limits default to `size`; explicit values, zero
    /// included, are kept as given and checked by validation.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawStageSettings = serde_json::from_str(json)?;
        Ok(Self {
            size: raw.size,
            job_queue_limit: raw.job_queue_limit.unwrap_or(raw.size),
            result_queue_limit: raw.result_queue_limit.unwrap_or(raw.size),
            max_retry: raw.max_retry,
            recover_panic: raw.recover_panic,
            backoff: raw.backoff,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::ZeroSize);
        }
        if self.job_queue_limit == 0 {
            return Err(ConfigError::ZeroJobQueueLimit);
        }
        if self.result_queue_limit == 0 {
            return Err(ConfigError::ZeroResultQueueLimit);
        }
        Ok(())
    }
}

/// Configuration of one stage turning jobs of type `J` into results of type `R`.
///
/// Immutable once the stage starts; all workers of the stage share it.
pub struct Config<J, R> {
    /// Worker count, queue limits and retry policy.
    pub settings: StageSettings,
    /// The capability invoked for every attempt.
    pub worker: Option<Arc<dyn Worker<J, R>>>,
}

impl<J, R> Config<J, R> {
    /// Creates a fully specified configuration.
    pub fn new<W>(
        size: usize,
        job_queue_limit: usize,
        result_queue_limit: usize,
        max_retry: u32,
        recover_panic: bool,
        worker: W,
    ) -> Self
    where
        W: Worker<J, R> + 'static,
    {
        Self {
            settings: StageSettings {
                size,
                job_queue_limit,
                result_queue_limit,
                max_retry,
                recover_panic,
                backoff: RetryBackoff::Immediate,
            },
            worker: Some(Arc::new(worker)),
        }
    }

    /// Creates a configuration with queue limits equal to `size`, no
    /// retries and no panic recovery.
    pub fn with_defaults<W>(size: usize, worker: W) -> Self
    where
        W: Worker<J, R> + 'static,
    {
        Self::from_settings(StageSettings::new(size), worker)
    }

    /// Creates a configuration from loaded settings.
    pub fn from_settings<W>(settings: StageSettings, worker: W) -> Self
    where
        W: Worker<J, R> + 'static,
    {
        Self {
            settings,
            worker: Some(Arc::new(worker)),
        }
    }

    /// Creates a configuration without a worker.
    ///
    /// It fails validation until [`Config::with_worker`] supplies one.
    #[must_use]
    pub fn unset(settings: StageSettings) -> Self {
        Self {
            settings,
            worker: None,
        }
    }

    /// Sets the worker.
    #[must_use]
    pub fn with_worker<W>(mut self, worker: W) -> Self
    where
        W: Worker<J, R> + 'static,
    {
        self.worker = Some(Arc::new(worker));
        self
    }

    /// Sets both queue limits.
    #[must_use]
    pub fn with_queue_limits(mut self, job_queue_limit: usize, result_queue_limit: usize) -> Self {
        self.settings.job_queue_limit = job_queue_limit;
        self.settings.result_queue_limit = result_queue_limit;
        self
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.settings.max_retry = max_retry;
        self
    }

    /// Sets whether panics are recovered.
    #[must_use]
    pub fn with_recover_panic(mut self, recover_panic: bool) -> Self {
        self.settings.recover_panic = recover_panic;
        self
    }

    /// Sets the retry backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.settings.backoff = backoff;
        self
    }

    /// Validates the configuration.
    ///
    /// Checks size, job queue limit, result queue limit, then worker presence,
    /// and reports only the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        if self.worker.is_none() {
            return Err(ConfigError::MissingWorker);
        }
        Ok(())
    }

    /// Validates and splits the configuration into a ready-to-run spec.
    pub(crate) fn into_spec(self) -> Result<StageSpec<J, R>, ConfigError> {
        self.settings.validate()?;
        match self.worker {
            Some(worker) => Ok(StageSpec {
                settings: self.settings,
                worker,
            }),
            None => Err(ConfigError::MissingWorker),
        }
    }
}

impl<J, R> Clone for Config<J, R> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            worker: self.worker.clone(),
        }
    }
}

impl<J, R> fmt::Debug for Config<J, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("settings", &self.settings)
            .field("has_worker", &self.worker.is_some())
            .finish()
    }
}

/// A validated configuration whose worker is known to be present.
pub(crate) struct StageSpec<J, R> {
    pub(crate) settings: StageSettings,
    pub(crate) worker: Arc<dyn Worker<J, R>>,
}
