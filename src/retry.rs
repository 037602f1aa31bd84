//! Bounded exponential-backoff retry for the AI call.
//!
//! Retries transient failures only (see [`crate::failure`]); permanent
//! failures and the final exhausted attempt propagate unchanged. The
//! circuit breaker wraps the entire retrying operation, so repeated
//! transient failures count as one breaker decision per logical request.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::failure::{classify, FailureKind};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(4);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Retry schedule: up to `max_attempts` total attempts, doubling waits from
/// `base_delay` capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the retry following attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doubled = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        doubled.min(self.max_delay)
    }

    /// Run `op`, retrying transient failures with backoff.
    ///
    /// The backoff sleep is a plain `tokio::time::sleep`, so dropping the
    /// returned future cancels any pending wait.
    pub async fn run<F, Fut, T, E>(&self, op: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let exhausted = attempt >= self.max_attempts;
                    if exhausted || classify(&err.to_string()) == FailureKind::Permanent {
                        return Err(err);
                    }
                    let delay = self.backoff(attempt);
                    warn!(
                        "attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, self.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_schedule_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.backoff(3), Duration::from_secs(10));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_transient_failure_retried_to_exhaustion() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = fast_policy()
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("upstream returned 503".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err(), "upstream returned 503");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_retried_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, String> = fast_policy()
            .run(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("request timeout".to_string())
                } else {
                    Ok("ok")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = fast_policy()
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("invalid api key".to_string())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_needs_single_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = fast_policy()
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
