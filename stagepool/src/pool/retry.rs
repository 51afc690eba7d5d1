//! Retry bookkeeping for a single job.
//!
//! Retries run synchronously on the worker that owns the job. By default there
//! is no delay between attempts; a backoff is an explicit opt-in.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay inserted before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Retry immediately.
    #[default]
    Immediate,
    /// delay = base
    Constant {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// delay = base * retry
    Linear {
        /// Delay per retry in milliseconds.
        delay_ms: u64,
    },
    /// delay = min(base * 2^(retry - 1), max)
    Exponential {
        /// Delay before the first retry in milliseconds.
        base_delay_ms: u64,
        /// Delay cap in milliseconds.
        max_delay_ms: u64,
    },
}

impl RetryBackoff {
    /// Calculates the delay before the given retry (1-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let millis = match *self {
            Self::Immediate => 0,
            Self::Constant { delay_ms } => delay_ms,
            Self::Linear { delay_ms } => delay_ms.saturating_mul(u64::from(retry)),
            Self::Exponential {
                base_delay_ms,
                max_delay_ms,
            } => {
                let factor = 2u64.saturating_pow(retry.saturating_sub(1));
                base_delay_ms.saturating_mul(factor).min(max_delay_ms)
            }
        };
        Duration::from_millis(millis)
    }
}

/// State tracking for the attempts made at one job.
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    max_retry: u32,
    attempts: u32,
}

impl RetryState {
    /// Creates a new retry state allowing `max_retry` retries after the first attempt.
    #[must_use]
    pub fn new(max_retry: u32) -> Self {
        Self {
            max_retry,
            attempts: 0,
        }
    }

    /// Records the start of an attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Returns the number of attempts started so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the number of retries used so far.
    #[must_use]
    pub fn retries_used(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// Returns true if another attempt is allowed after a failure.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retries_used() < self.max_retry
    }
}
