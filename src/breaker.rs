//! Circuit breaker guarding the AI dependency.
//!
//! One instance per AI backend, shared by every concurrent request. The
//! gate check and state transitions happen under a single lock, which is
//! never held across an await: the wrapped call runs unlocked and reports
//! its outcome afterwards, so a request that is cancelled mid-call feeds
//! nothing into the breaker.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; consecutive failures are counted.
    Closed,
    /// Calls fail fast until the cooldown elapses.
    Open,
    /// A single trial call is in flight.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The breaker is open; the dependency was not called.
    #[error("circuit breaker is open")]
    Open,
    /// The wrapped operation failed; its state impact has been recorded.
    #[error("{0}")]
    Service(E),
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
}

/// Tri-state circuit breaker over an async operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerState>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
            }),
            failure_threshold,
            cooldown,
        }
    }

    /// Execute `op` under breaker protection.
    ///
    /// Fails fast with [`BreakerError::Open`] while the breaker is gating;
    /// otherwise runs the operation and records its outcome before
    /// propagating it.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            warn!("circuit breaker is open, failing fast");
            return Err(BreakerError::Open);
        }

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(BreakerError::Service(err))
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failure_count
    }

    /// Gate check. In `Open`, the first caller to observe an elapsed
    /// cooldown flips the breaker to `HalfOpen` and becomes the single
    /// trial; everyone else fails fast until the trial resolves.
    fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure_at
                    .map(|at| at.elapsed() > self.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    info!("circuit breaker transitioning to half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::HalfOpen {
            info!("circuit breaker reset to closed after successful trial");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count += 1;
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            // A single half-open failure re-opens, regardless of the count.
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                warn!("circuit breaker re-opened after failed trial");
            }
            CircuitState::Closed if inner.failure_count >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                error!(
                    "circuit breaker opened after {} failures",
                    inner.failure_count
                );
            }
            _ => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn failing_call(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BreakerError<&'static str>> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            })
            .await
            .map(|_| ())
    }

    #[tokio::test]
    async fn test_opens_at_threshold_and_fails_fast() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        assert!(matches!(
            failing_call(&breaker, &calls).await,
            Err(BreakerError::Service("boom"))
        ));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 1);

        assert!(failing_call(&breaker, &calls).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        // Third call fails fast without invoking the operation.
        assert!(matches!(
            failing_call(&breaker, &calls).await,
            Err(BreakerError::Open)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        failing_call(&breaker, &calls).await.ok();
        failing_call(&breaker, &calls).await.ok();
        assert_eq!(breaker.failure_count(), 2);

        let ok: Result<u32, BreakerError<&str>> = breaker.call(|| async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_success_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        let calls = AtomicU32::new(0);

        failing_call(&breaker, &calls).await.ok();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;

        let ok: Result<&str, BreakerError<&str>> = breaker.call(|| async { Ok("recovered") }).await;
        assert_eq!(ok.unwrap(), "recovered");
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        let calls = AtomicU32::new(0);

        failing_call(&breaker, &calls).await.ok();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(matches!(
            failing_call(&breaker, &calls).await,
            Err(BreakerError::Service("boom"))
        ));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_open_before_cooldown_does_not_attempt() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        failing_call(&breaker, &calls).await.ok();
        assert!(matches!(
            failing_call(&breaker, &calls).await,
            Err(BreakerError::Open)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_half_open_admits_exactly_one_trial() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.on_failure();
        std::thread::sleep(Duration::from_millis(5));

        // First acquire takes the trial slot, second is rejected.
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.try_acquire());
    }
}
