//! Retry bookkeeping shared by the async and blocking transports.
//!
//! Only transport-level failures (timeouts, refused connections, other
//! request errors) are retried. An HTTP error status is a definitive answer
//! from the server and is never retried.

use std::time::Duration;

use super::config::ClientConfig;
use super::error::{ErrorKind, OllamaError};

/// Delay before retrying after failed attempt `attempt_index` (0-based):
/// `base * 2^attempt_index`.
pub fn backoff_delay(base: Duration, attempt_index: u32) -> Duration {
    base.saturating_mul(1_u32 << attempt_index.min(20))
}

/// Attempt counter for one transport call.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryState {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_retries.saturating_add(1),
            base_delay,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_retries, config.backoff_base)
    }

    /// Start the next attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff to sleep after the current attempt failed, or `None` when it
    /// was the last permitted one.
    pub fn next_delay(&self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            None
        } else {
            Some(backoff_delay(self.base_delay, self.attempt.saturating_sub(1)))
        }
    }
}

/// A single attempt that failed below the HTTP layer.
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    Timeout(reqwest::Error),
    Connection(reqwest::Error),
    Unexpected(reqwest::Error),
}

impl AttemptFailure {
    pub(crate) fn classify(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AttemptFailure::Timeout(err)
        } else if err.is_connect() {
            AttemptFailure::Connection(err)
        } else {
            AttemptFailure::Unexpected(err)
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            AttemptFailure::Timeout(_) => "timeout",
            AttemptFailure::Connection(_) => "connection failure",
            AttemptFailure::Unexpected(_) => "unexpected error",
        }
    }

    /// Error raised once retries are exhausted.
    pub(crate) fn into_error(self, url: &str, attempts: u32, timeout: Duration) -> OllamaError {
        match self {
            AttemptFailure::Timeout(e) => OllamaError::new(
                ErrorKind::Timeout,
                format!(
                    "request to {url} timed out after {attempts} attempt(s) of {:.1}s",
                    timeout.as_secs_f64()
                ),
            )
            .with_source(e),
            AttemptFailure::Connection(e) => OllamaError::new(
                ErrorKind::ConnectionFailure,
                format!("connection to {url} failed after {attempts} attempt(s): {e}"),
            )
            .with_source(e),
            AttemptFailure::Unexpected(e) => OllamaError::new(
                ErrorKind::Api,
                format!("unexpected error calling {url} after {attempts} attempt(s): {e}"),
            )
            .with_source(e),
        }
    }
}
