//! Stage-level retries with linear backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::ProcessingLimits;
use crate::error::EnrichError;

/// How often and how patiently a stage call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first call.
    pub retries: u32,
    /// Base delay, multiplied by the attempt number.
    pub delay: Duration,
    /// Limit for each individual call.
    pub stage_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_limits(&ProcessingLimits::default())
    }
}

/// Final result of a retried call and how many calls it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub outcome: Result<T, EnrichError>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn from_limits(limits: &ProcessingLimits) -> Self {
        Self {
            retries: limits.retry_attempts,
            delay: limits.retry_delay(),
            stage_timeout: limits.stage_timeout(),
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }

    /// Calls `op` until it succeeds, the retries run out, or `cancel` fires.
    /// Cancellation is never retried.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EnrichError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(EnrichError::Cancelled),
                result = tokio::time::timeout(self.stage_timeout, op()) => {
                    result.unwrap_or(Err(EnrichError::Timeout(self.stage_timeout)))
                }
            };

            let error = match outcome {
                Ok(value) => {
                    return Attempted {
                        outcome: Ok(value),
                        attempts,
                    }
                }
                Err(EnrichError::Cancelled) => {
                    return Attempted {
                        outcome: Err(EnrichError::Cancelled),
                        attempts,
                    }
                }
                Err(e) if attempts > self.retries => {
                    return Attempted {
                        outcome: Err(e),
                        attempts,
                    }
                }
                Err(e) => e,
            };

            let wait = self.backoff(attempts);
            tracing::debug!(attempt = attempts, ?wait, error = %error, "stage failed, retrying");
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Attempted {
                        outcome: Err(EnrichError::Cancelled),
                        attempts,
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
