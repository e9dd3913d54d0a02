//! Bounded retry with exponential backoff
//!
//! Transient failures are retried on a fixed, finite schedule: the attempt
//! count and the backoff cap are decided up front, so every retry loop
//! terminates. Terminal failures (not-found, malformed) are returned on the
//! first occurrence.

use crate::config::RetryConfig;
use crate::fetch::{FetchError, FetchResult};
use std::future::Future;
use std::time::Duration;

/// Retry schedule for transient fetch failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay to wait after a failed attempt (1-based), capped at max_delay
    pub fn backoff(&self, attempt: u32) -> Duration {
        // Shift capped well below u32 overflow; max_delay clamps the rest
        let factor = 1u32 << attempt.saturating_sub(1).min(20);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Runs a fetch operation under a retry policy
///
/// Retries only transient failures, sleeping the backoff delay between
/// attempts. Returns the last error once attempts are exhausted.
///
/// # Arguments
///
/// * `policy` - The retry schedule
/// * `operation` - Closure producing a fresh future per attempt
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> FetchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    "Attempt {attempt}/{} failed ({e}), retrying in {delay:?}",
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
