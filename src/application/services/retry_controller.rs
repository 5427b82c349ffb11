//! Bounded retries with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::errors::ImageError;

/// Default number of attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Upper bound on attempts, used by constrained environments.
pub const MAX_ATTEMPTS_LIMIT: u32 = 5;

/// Retry policy: attempt bound and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy; attempts are clamped to `1..=MAX_ATTEMPTS_LIMIT`.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
            base_delay: Duration::from_secs(1),
        }
    }

    /// Overrides the backoff base (one second by default).
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Returns the attempt bound.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based): `base * 2^attempt`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Final result of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Success value or the last attempt's error.
    pub result: Result<T, ImageError>,
    /// Number of attempts performed.
    pub attempts: u32,
}

/// Runs an operation until it succeeds, fails deterministically, or runs out of attempts.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    /// Creates a controller with the given policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `op`, passing the 1-based attempt number.
    ///
    /// Backoff sleeps only suspend the calling task.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ImageError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(error) if !error.is_retryable() => {
                    debug!(attempt, error = %error, "Not retrying deterministic failure");
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt,
                    };
                }
                Err(error) if attempt >= self.policy.max_attempts => {
                    warn!(attempts = attempt, error = %error, "All attempts exhausted");
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    let delay = self.policy.delay_after(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "Attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
