//! Execution controls: per-attempt timeout and bounded retry with backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::AdapterError;
use crate::config::{AutonomyConfig, BackoffStrategy};

/// Attempt budget for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1).
    pub max_attempts: u32,
    /// Wall-clock limit for a single attempt.
    pub attempt_timeout_ms: Option<u64>,
    pub retry_delay_ms: u64,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AutonomyConfig::default(), None)
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AutonomyConfig, attempt_timeout_ms: Option<u64>) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            attempt_timeout_ms,
            retry_delay_ms: config.retry_delay_ms,
            backoff: config.backoff,
        }
    }

    /// Sleep after attempt `attempt` fails.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            BackoffStrategy::Fixed => self.retry_delay_ms,
            BackoffStrategy::Exponential => self
                .retry_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))),
        };
        Duration::from_millis(ms)
    }
}

/// Every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: AdapterError,
}

/// Run `attempt_fn` until it succeeds or the attempt budget is spent.
///
/// `attempt_fn` receives the 1-based attempt number. A timed-out attempt is
/// reported as [`AdapterError::Timeout`] and counts toward the budget.
/// `on_failure` sees each failed attempt before the retry delay; the caller
/// must not hold any lock across this call.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut on_failure: impl FnMut(u32, &AdapterError),
    mut attempt_fn: F,
) -> Result<(T, u32), RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match policy.attempt_timeout_ms {
            Some(limit_ms) => {
                match tokio::time::timeout(Duration::from_millis(limit_ms), attempt_fn(attempt)).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(AdapterError::Timeout { limit_ms }),
                }
            }
            None => attempt_fn(attempt).await,
        };

        match outcome {
            Ok(value) => return Ok((value, attempt)),
            Err(err) => {
                on_failure(attempt, &err);
                if attempt >= max_attempts {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                tokio::time::sleep(policy.delay_after(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            attempt_timeout_ms: None,
            retry_delay_ms: 10,
            backoff: BackoffStrategy::Fixed,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let (value, attempts) = execute_with_retry(&policy(3), |_, _| {}, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(AdapterError::Transient("flaky".into()))
                } else {
                    Ok(attempt * 10)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!((value, attempts), (30, 3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let mut seen = Vec::new();
        let err = execute_with_retry(
            &policy(2),
            |attempt, _| seen.push(attempt),
            |attempt| async move { Err::<(), _>(AdapterError::Transient(format!("fail {attempt}"))) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.last_error, AdapterError::Transient("fail 2".into()));
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_attempt() {
        let policy = RetryPolicy {
            attempt_timeout_ms: Some(50),
            ..policy(2)
        };
        let err = execute_with_retry(&policy, |_, _| {}, |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), AdapterError>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.last_error, AdapterError::Timeout { limit_ms: 50 });
    }

    #[test]
    fn test_exponential_delay() {
        let policy = RetryPolicy {
            backoff: BackoffStrategy::Exponential,
            retry_delay_ms: 100,
            ..policy(4)
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));

        let fixed = RetryPolicy {
            backoff: BackoffStrategy::Fixed,
            ..policy
        };
        assert_eq!(fixed.delay_after(3), Duration::from_millis(100));
    }
}
