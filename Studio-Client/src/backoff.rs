//! Cancellable retry with exponential backoff and jitter.
//!
//! [`BackoffExecutor`] drives any async operation through up to
//! [`RetryConfig::max_attempts`] attempts. Between attempts it sleeps for
//! `min(base_delay * 2^(attempt-1) + jitter, max_delay)`, where the jitter is
//! uniform in `[0, 30%]` of the exponential part. The sleep and the operation
//! itself both race the caller's [`CancellationToken`].

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// Fraction of the exponential delay used as the upper bound for jitter.
const JITTER_FRACTION: f64 = 0.3;

/// Errors the executor knows how to classify.
pub trait RetryableError: std::fmt::Display {
    /// The error returned when the token is cancelled.
    fn cancelled() -> Self;

    /// Whether this error is the cancellation error.
    fn is_cancelled(&self) -> bool;

    /// Whether another attempt may succeed. Defaults to `true`.
    fn is_retryable(&self) -> bool {
        true
    }
}

impl RetryableError for ClientError {
    fn cancelled() -> Self {
        ClientError::Cancelled
    }

    fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, ClientError::Validation(_) | ClientError::Json(_))
    }
}

/// Retry limits and delays.
///
/// # Example
///
/// ```
/// use studio_client::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::default().with_max_attempts(5);
/// assert_eq!(config.base_delay, Duration::from_millis(300));
/// assert_eq!(config.exponential_delay(3), Duration::from_millis(1200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one. Values below 1 act as 1.
    pub max_attempts: u32,

    /// Delay before the first retry, before jitter.
    pub base_delay: Duration,

    /// Upper bound on any single delay, jitter included.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// `base_delay * 2^(attempt-1)` for a 1-based attempt number, without jitter or cap.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Delay after `attempt` failed, with `jitter_unit` in `[0, 1]` scaling
    /// the jitter between none and the full 30%.
    pub fn delay_with_jitter(&self, attempt: u32, jitter_unit: f64) -> Duration {
        let exponential = self.exponential_delay(attempt);
        let jitter_nanos =
            exponential.as_nanos() as f64 * JITTER_FRACTION * jitter_unit.clamp(0.0, 1.0);
        let jitter = Duration::from_nanos(jitter_nanos as u64);
        exponential.saturating_add(jitter).min(self.max_delay)
    }

    /// Delay after `attempt` failed, with random jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, rand::random::<f64>())
    }
}

/// Emitted before each backoff sleep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEvent {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub max_attempts: u32,
    /// How long the executor will wait before the next attempt.
    pub delay: Duration,
    /// Display text of the failure.
    pub message: String,
}

/// Runs an operation with retries.
#[derive(Debug, Clone, Default)]
pub struct BackoffExecutor {
    config: RetryConfig,
}

impl BackoffExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `operation` until it succeeds, fails permanently, runs out of
    /// attempts, or `cancel` fires.
    ///
    /// `on_retry` is called once per scheduled retry, never after the final
    /// attempt. Cancellation always yields `E::cancelled()`, whether it is
    /// observed before an attempt, while an attempt is running, or during
    /// the sleep.
    pub async fn execute<T, E, F, Fut, N>(
        &self,
        mut operation: F,
        cancel: &CancellationToken,
        mut on_retry: N,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError,
        N: FnMut(&RetryEvent),
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                tracing::debug!(attempt, "Cancelled before attempt");
                return Err(E::cancelled());
            }

            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt, "Cancelled during attempt");
                    return Err(E::cancelled());
                }
                result = operation() => result,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if err.is_cancelled() || cancel.is_cancelled() {
                return Err(E::cancelled());
            }

            if !err.is_retryable() {
                tracing::debug!(attempt, error = %err, "Failure is not retryable");
                return Err(err);
            }

            if attempt >= max_attempts {
                tracing::warn!(attempt, error = %err, "Giving up after final attempt");
                return Err(err);
            }

            let delay = self.config.delay_for_attempt(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, backing off",
            );

            on_retry(&RetryEvent {
                attempt,
                max_attempts,
                delay,
                message: err.to_string(),
            });

            tokio::select! {
                _ = cancel.cancelled() => return Err(E::cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
