//! Retry policy with configurable backoff
//!
//! Failures are classified into condition tags; a retry happens only when
//! the failure's tag is in the policy's `retry_on` set. The executor never
//! retries validation-style errors, and after exhausting `max_attempts`
//! the last error is surfaced unchanged.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use core_kernel::PortError;

/// Hard ceiling applied when a policy sets no `max_delay`
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Delay growth strategy between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Every delay equals `initial_delay`
    Fixed,
    /// `initial_delay * attempt`
    Linear,
    /// `initial_delay * 2^(attempt - 1)`
    Exponential,
}

/// Failure classes a policy may retry on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryCondition {
    /// The request timed out
    Timeout,
    /// The upstream answered with a 5xx status
    ServerError,
    /// Connection-level failure with no status code
    NetworkError,
    /// The upstream answered 429
    RateLimit,
}

impl RetryCondition {
    /// Classifies a port error, `None` for non-retryable failures
    pub fn classify(error: &PortError) -> Option<Self> {
        match error {
            PortError::Timeout { .. } => Some(RetryCondition::Timeout),
            PortError::Connection { .. } => Some(RetryCondition::NetworkError),
            PortError::RateLimited { .. } => Some(RetryCondition::RateLimit),
            PortError::Upstream { status, .. } if (500..600).contains(status) => {
                Some(RetryCondition::ServerError)
            }
            _ => None,
        }
    }
}

/// Retry configuration carried on every [`crate::IntegrationConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffType,
    pub initial_delay: Duration,
    /// Cap on any single delay; `None` means the 60s default cap
    #[serde(default)]
    pub max_delay: Option<Duration>,
    pub retry_on: Vec<RetryCondition>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffType::Exponential,
            initial_delay: Duration::from_millis(1000),
            max_delay: None,
            retry_on: vec![
                RetryCondition::Timeout,
                RetryCondition::ServerError,
                RetryCondition::NetworkError,
                RetryCondition::RateLimit,
            ],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            retry_on: vec![],
            ..Default::default()
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let raw = match self.backoff {
            BackoffType::Fixed => self.initial_delay,
            BackoffType::Linear => self.initial_delay.saturating_mul(attempt),
            BackoffType::Exponential => self
                .initial_delay
                .saturating_mul(2u32.saturating_pow(attempt - 1)),
        };
        raw.min(self.max_delay.unwrap_or(DEFAULT_MAX_DELAY))
    }

    /// Whether this policy retries the given failure
    pub fn should_retry(&self, error: &PortError) -> bool {
        match RetryCondition::classify(error) {
            Some(condition) => self.retry_on.contains(&condition),
            None => false,
        }
    }
}

/// Runs an operation under a retry policy
///
/// The closure is invoked once per attempt. Non-retryable failures and the
/// final attempt's failure return immediately with that error.
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> Result<T, PortError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PortError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_fn().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "operation recovered after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if attempt >= policy.max_attempts || !policy.should_retry(&error) {
                    return Err(error);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn exponential(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: BackoffType::Exponential,
            initial_delay: Duration::from_millis(1000),
            max_delay: None,
            retry_on: vec![
                RetryCondition::Timeout,
                RetryCondition::ServerError,
                RetryCondition::NetworkError,
                RetryCondition::RateLimit,
            ],
        }
    }

    #[test]
    fn test_exponential_delay_sequence() {
        let policy = exponential(5);
        let delays: Vec<u64> = (1..=4).map(|a| policy.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000]);
    }

    #[test]
    fn test_exponential_delay_capped_at_max() {
        let policy = RetryPolicy {
            max_delay: Some(Duration::from_millis(3000)),
            ..exponential(10)
        };
        assert_eq!(policy.delay_for(3).as_millis(), 3000);
        assert_eq!(policy.delay_for(8).as_millis(), 3000);
    }

    #[test]
    fn test_uncapped_delay_defaults_to_sixty_seconds() {
        let policy = exponential(20);
        assert_eq!(policy.delay_for(12), Duration::from_secs(60));
    }

    #[test]
    fn test_linear_and_fixed_backoff() {
        let mut policy = exponential(5);
        policy.backoff = BackoffType::Linear;
        assert_eq!(policy.delay_for(3).as_millis(), 3000);
        policy.backoff = BackoffType::Fixed;
        assert_eq!(policy.delay_for(3).as_millis(), 1000);
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            RetryCondition::classify(&PortError::Timeout {
                operation: "send".to_string(),
                duration_ms: 30_000
            }),
            Some(RetryCondition::Timeout)
        );
        assert_eq!(
            RetryCondition::classify(&PortError::Upstream {
                status: 503,
                message: "unavailable".to_string()
            }),
            Some(RetryCondition::ServerError)
        );
        assert_eq!(
            RetryCondition::classify(&PortError::Upstream {
                status: 404,
                message: "missing".to_string()
            }),
            None
        );
        assert_eq!(
            RetryCondition::classify(&PortError::connection("refused")),
            Some(RetryCondition::NetworkError)
        );
        assert_eq!(
            RetryCondition::classify(&PortError::RateLimited { retry_after_secs: 5 }),
            Some(RetryCondition::RateLimit)
        );
        assert_eq!(
            RetryCondition::classify(&PortError::validation("bad payload")),
            None
        );
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mut policy = exponential(4);
        policy.initial_delay = Duration::from_millis(1);

        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(PortError::connection("refused"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let policy = exponential(5);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PortError::validation("malformed")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let mut policy = exponential(3);
        policy.initial_delay = Duration::from_millis(1);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = execute_with_retry(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(PortError::Upstream {
                    status: 500,
                    message: format!("boom {n}"),
                })
            }
        })
        .await;

        match result {
            Err(PortError::Upstream { message, .. }) => assert_eq!(message, "boom 2"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_condition_not_in_policy_is_not_retried() {
        let mut policy = exponential(5);
        policy.retry_on = vec![RetryCondition::Timeout];
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = execute_with_retry(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(PortError::Upstream {
                    status: 502,
                    message: "bad gateway".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
