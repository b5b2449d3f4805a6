//! Circuit breaker guarding a single call site.
//!
//! ```text
//! closed --threshold failures--> open --reset_timeout--> half-open
//!   ^                                                      |   |
//!   +------------- half_open_successes successes ----------+   |
//!                  open <-------- any failure -----------------+
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Source of monotonic time for the breaker.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock advanced by hand, for deterministic tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let elapsed = *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        self.start + elapsed
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are rejected without running.
    Open,
    /// Trial calls pass through to probe recovery.
    HalfOpen,
}

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures in closed state that open the breaker.
    pub threshold: u32,
    /// Time since the last failure before an open breaker admits a trial call.
    pub reset_timeout: Duration,
    /// Consecutive half-open successes that close the breaker.
    pub half_open_successes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_successes: 2,
        }
    }
}

/// Read-only view of breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call; the operation did not run.
    #[error("circuit breaker is open")]
    Open,

    /// The operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

/// Closed / open / half-open guard around one logical call site.
#[derive(Debug)]
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: BreakerConfig,
    clock: C,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker<SystemClock> {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn with_clock(name: impl Into<String>, config: BreakerConfig, clock: C) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Runs `operation` unless the breaker is open, recording its outcome.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.acquire() {
            return Err(BreakerError::Open);
        }
        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Admits or rejects one call. An open breaker whose reset timeout has
    /// elapsed moves to half-open and admits the call.
    fn acquire(&self) -> bool {
        let mut s = self.lock();
        if s.state != CircuitState::Open {
            return true;
        }

        let cooled_down = s
            .last_failure
            .is_none_or(|at| self.clock.now().duration_since(at) >= self.config.reset_timeout);
        if !cooled_down {
            return false;
        }

        s.state = CircuitState::HalfOpen;
        s.success_count = 0;
        info!(breaker = %self.name, "circuit half-open, admitting trial call");
        true
    }

    fn record_success(&self) {
        let mut s = self.lock();
        match s.state {
            CircuitState::Closed => s.failure_count = 0,
            CircuitState::HalfOpen => {
                s.success_count += 1;
                if s.success_count >= self.config.half_open_successes {
                    s.state = CircuitState::Closed;
                    s.failure_count = 0;
                    s.success_count = 0;
                    info!(breaker = %self.name, "circuit closed");
                }
            }
            // A call admitted before another caller opened the breaker.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let now = self.clock.now();
        let mut s = self.lock();
        match s.state {
            CircuitState::Closed => {
                s.failure_count += 1;
                s.last_failure = Some(now);
                if s.failure_count >= self.config.threshold {
                    s.state = CircuitState::Open;
                    warn!(
                        breaker = %self.name,
                        failures = s.failure_count,
                        "circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                s.state = CircuitState::Open;
                s.failure_count += 1;
                s.success_count = 0;
                s.last_failure = Some(now);
                warn!(breaker = %self.name, "trial call failed, circuit reopened");
            }
            CircuitState::Open => {
                s.last_failure = Some(now);
            }
        }
    }

    /// Forces the breaker closed and clears all counters.
    pub fn reset(&self) {
        let mut s = self.lock();
        s.state = CircuitState::Closed;
        s.failure_count = 0;
        s.success_count = 0;
        s.last_failure = None;
    }

    /// Current state and counters.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let s = self.lock();
        BreakerSnapshot {
            state: s.state,
            failure_count: s.failure_count,
            success_count: s.success_count,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
