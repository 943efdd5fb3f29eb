//! Bounded retry with exponential backoff for unreliable remote calls
//!
//! Every attempt runs under its own timeout. A timeout counts as a failed
//! attempt and is retried like any other failure.

use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// Retry policy for remote calls
///
/// Controls how many attempts a call gets and how long to wait between
/// them using exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt (doubles each attempt)
    pub initial_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Compute the delay after a failed attempt.
///
/// `attempt` is zero-based: the delay is `initial_delay * 2^attempt`,
/// capped at `policy.max_delay`.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy
        .initial_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay)
}

/// Run `call` until it succeeds or the policy's attempts are used up.
///
/// `call` receives the zero-based attempt index. Each attempt is bounded by
/// `timeout`. `InvalidInput` errors are returned as-is without retrying.
///
/// # Errors
///
/// Returns `Error::RemoteOperationFailed` carrying the last attempt's error
/// once every attempt has failed.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    timeout: Duration,
    mut call: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let outcome = tokio::time::timeout(timeout, call(attempt))
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout {
                    operation,
                    after: timeout,
                })
            });

        let err = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(operation, attempts = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e @ Error::InvalidInput(_)) => return Err(e),
            Err(e) => e,
        };

        attempt += 1;
        if attempt >= max_attempts {
            tracing::error!(operation, attempts = attempt, error = %err, "retries exhausted");
            return Err(Error::RemoteOperationFailed {
                operation,
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = delay_for_attempt(policy, attempt - 1);
        tracing::warn!(
            operation,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "attempt failed, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
