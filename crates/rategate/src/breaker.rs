//! Process-local circuit breaker

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use rategate_core::{RateError, Result};

/// Consecutive failures before the breaker opens
pub const DEFAULT_THRESHOLD: u32 = 5;

/// How long an open breaker rejects calls before probing again
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Breaker state snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
}

/// Three-state circuit breaker with time-based recovery
///
/// All state reads and transitions are serialized under a single mutex; the
/// mutex is never held while the wrapped call runs. The breaker is local to
/// one process; each worker keeps its own view of the upstream.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<Inner>>,
    threshold: u32,
    timeout: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_TIMEOUT)
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
            })),
            threshold,
            timeout,
        }
    }

    /// Run `body`, rejecting with `BreakerOpen` while the breaker is open
    ///
    /// An open breaker whose timeout has elapsed transitions to half-open and
    /// lets the call through as a probe. The call's outcome is recorded.
    pub async fn call<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.before_call()?;
        match body().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn before_call(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let eligible = inner
                    .last_failure
                    .is_none_or(|at| at.elapsed() >= self.timeout);
                if eligible {
                    inner.state = BreakerState::HalfOpen;
                    tracing::debug!("breaker half-open, probing upstream");
                    Ok(())
                } else {
                    Err(RateError::BreakerOpen)
                }
            }
        }
    }

    /// Record a successful call observed outside `call`
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.failures = 0;
            }
            BreakerState::Closed => {
                inner.failures = 0;
            }
            BreakerState::Open => {}
        }
    }

    /// Record a failed call observed outside `call`
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.threshold {
                    inner.state = BreakerState::Open;
                    inner.last_failure = Some(Instant::now());
                    tracing::warn!(failures = inner.failures, "breaker opened");
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.last_failure = Some(Instant::now());
                tracing::warn!("breaker reopened after failed probe");
            }
            BreakerState::Open => {}
        }
    }

    /// Whether a call would currently be rejected
    ///
    /// An open breaker whose timeout has already elapsed reports `false`: the
    /// next call will run as a half-open probe.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            BreakerState::Open => inner
                .last_failure
                .is_some_and(|at| at.elapsed() < self.timeout),
            _ => false,
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    /// Force the breaker closed with a zero failure count
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.failures = 0;
        inner.last_failure = None;
    }
}
