//! Bounded exponential-backoff retry for remote calls.
//!
//! Only errors accepted by the caller's retryability predicate are
//! retried (rate limits, in the default policy); everything else is
//! permanent for the current operation and propagates immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ServiceError, ServiceResult};

/// Retry policy for transient remote failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and initial delay.
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Default::default()
        }
    }

    /// Sets the delay multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.multiplier)
    }
}

/// Invokes `operation`, retrying failures that `is_retryable` accepts.
///
/// The delay starts at the policy's initial value and grows by the
/// policy's multiplier after each failed attempt; the sleep blocks only
/// the calling task. No sleep follows the final attempt. Errors rejected
/// by the predicate propagate immediately with zero delay; exhausting the
/// budget fails with a retry-exhausted error carrying the attempt count.
pub async fn execute_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&ServiceError) -> bool,
    operation: F,
) -> ServiceResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let mut delay = policy.initial_delay;

    for attempt in 1..=policy.max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if is_retryable(&err) => {
                if attempt == policy.max_retries {
                    break;
                }
                warn!(
                    "transient failure (attempt {}/{}), retrying in {:?}: {}",
                    attempt, policy.max_retries, delay, err
                );
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
            }
            Err(err) => return Err(err),
        }
    }

    Err(ServiceError::retry_exhausted(policy.max_retries))
}
