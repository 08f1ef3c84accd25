//! Retry policy and the explicit retry-loop combinator.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use kwplanner_shared::{AppConfig, RequestError};

/// How many times to try a request and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Random extra delay as a fraction of the backoff (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl From<&AppConfig> for RetryPolicy {
    fn from(config: &AppConfig) -> Self {
        let gateway = &config.gateway;
        Self {
            max_attempts: gateway.max_attempts.max(1),
            base_delay: Duration::from_millis(gateway.base_delay_ms),
            max_delay: Duration::from_millis(gateway.max_delay_ms),
            multiplier: gateway.backoff_multiplier,
            jitter_factor: gateway.jitter_factor.clamp(0.0, 1.0),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately. Useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Exponential delay before retry number `retry` (1-based), jittered and capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = backoff_ms.min(self.max_delay.as_millis() as f64).max(0.0) as u64;

        let jitter_range = (capped_ms as f64 * self.jitter_factor) as u64;
        let jitter = if jitter_range > 0 {
            fastrand::u64(0..=jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped_ms.saturating_add(jitter)).min(self.max_delay)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Wait the policy's backoff delay.
    Backoff,
    /// Wait a server-specified delay.
    After(Duration),
    NoRetry,
}

/// Classify a failure.
pub fn retry_strategy(error: &RequestError) -> RetryStrategy {
    match error {
        RequestError::Transient { .. } => RetryStrategy::Backoff,
        RequestError::RateLimited {
            retry_after: Some(delay),
        } => RetryStrategy::After(*delay),
        RequestError::RateLimited { retry_after: None } => RetryStrategy::Backoff,
        RequestError::Permanent { .. } | RequestError::RetryExhausted { .. } => {
            RetryStrategy::NoRetry
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the attempts run out.
///
/// The closure receives the 1-based attempt number. Exhausted transient failures
/// surface as [`RequestError::RetryExhausted`].
pub async fn retry_with<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RequestError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let err = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let delay = match retry_strategy(&err) {
            RetryStrategy::NoRetry => {
                error!(operation = operation_name, error = %err, "request failed permanently");
                return Err(err);
            }
            _ if attempt == max_attempts => {
                warn!(operation = operation_name, attempts = attempt, error = %err, "retries exhausted");
                return Err(RequestError::RetryExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }
            RetryStrategy::Backoff => policy.delay_for(attempt),
            RetryStrategy::After(server_delay) => server_delay.min(policy.max_delay),
        };

        debug!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed, retrying"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    // max_attempts >= 1, so the loop always returns.
    Err(RequestError::RetryExhausted {
        attempts: max_attempts,
        last: "no attempt made".into(),
    })
}
