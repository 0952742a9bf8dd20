//! Circuit breaker: windowed failure statistics and the closed / open /
//! half-open state machine.
//!
//! A breaker handle is shared: clones observe and mutate the same state. All
//! mutable state lives under a single mutex so the admission decision and a
//! state transition are atomic with respect to outcome recording, which is
//! what makes transitions linearizable across concurrent executions.

use crate::{
    Admission, Clock, ConfigError, ExecutionContext, ExecutionError, MonotonicClock, Outcome,
    PolicyExecutor,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Largest supported `m` in an n-of-m threshold. Outcome windows are
/// bit-packed, so the bound is the ring width.
pub const MAX_WINDOW: u32 = 128;

type Classifier<T, E> = Arc<dyn Fn(Option<&T>, Option<&ExecutionError<E>>) -> bool + Send + Sync>;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow through; failures accumulate in the window.
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// A bounded number of probes test whether the guarded resource recovered.
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct Threshold {
    n: u32,
    m: u32,
}

impl Threshold {
    fn validate(n: u32, m: u32) -> Result<Self, ConfigError> {
        if n == 0 || m == 0 || n > m {
            return Err(ConfigError::InvalidThreshold { n, m });
        }
        if m > MAX_WINDOW {
            return Err(ConfigError::WindowTooLarge { m, capacity: MAX_WINDOW });
        }
        Ok(Self { n, m })
    }
}

/// Bit-packed ring of the last `capacity` outcomes; a set bit is a hit.
#[derive(Debug, Clone)]
struct OutcomeWindow {
    bits: u128,
    capacity: u32,
}

impl OutcomeWindow {
    fn new(capacity: u32) -> Self {
        debug_assert!((1..=MAX_WINDOW).contains(&capacity));
        Self { bits: 0, capacity }
    }

    fn push(&mut self, hit: bool) {
        self.bits = (self.bits << 1) | u128::from(hit);
        if self.capacity < MAX_WINDOW {
            self.bits &= (1u128 << self.capacity) - 1;
        }
    }

    fn hits(&self) -> u32 {
        self.bits.count_ones()
    }

    fn clear(&mut self) {
        self.bits = 0;
    }
}

struct Inner {
    state: BreakerState,
    failures: OutcomeWindow,
    successes: OutcomeWindow,
    opened_at_millis: u64,
    probes: u32,
}

struct Shared<T, E> {
    failure_threshold: Threshold,
    success_threshold: Threshold,
    delay: Duration,
    classifier: Classifier<T, E>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

/// Shared circuit breaker; gate it into a stack with
/// [`PolicyStackBuilder::circuit_breaker`](crate::PolicyStackBuilder::circuit_breaker).
pub struct CircuitBreaker<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for CircuitBreaker<T, E> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T, E> std::fmt::Debug for CircuitBreaker<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failure_threshold", &self.shared.failure_threshold)
            .field("success_threshold", &self.shared.success_threshold)
            .field("delay", &self.shared.delay)
            .finish()
    }
}

impl<T, E> CircuitBreaker<T, E> {
    pub fn builder() -> CircuitBreakerBuilder<T, E> {
        CircuitBreakerBuilder::new()
    }

    /// Current state.
    pub fn state(&self) -> BreakerState {
        self.shared.inner.lock().unwrap().state
    }

    /// Force the breaker back to closed with cleared statistics.
    pub fn reset(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.state = BreakerState::Closed;
        inner.failures.clear();
        inner.successes.clear();
        inner.probes = 0;
    }

    fn try_acquire(&self) -> Result<(), ExecutionError<E>> {
        let mut inner = self.shared.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = self.shared.clock.now_millis().saturating_sub(inner.opened_at_millis);
                let delay = saturating_millis(self.shared.delay);
                if elapsed >= delay {
                    inner.state = BreakerState::HalfOpen;
                    inner.successes.clear();
                    inner.probes = 1;
                    tracing::info!("circuit breaker half-open, admitting probe");
                    Ok(())
                } else {
                    let remaining = Duration::from_millis(delay - elapsed);
                    tracing::warn!(
                        remaining_ms = delay - elapsed,
                        "circuit breaker rejected call"
                    );
                    Err(ExecutionError::CircuitOpen { remaining })
                }
            }
            BreakerState::HalfOpen => {
                if inner.probes < self.shared.success_threshold.m {
                    inner.probes += 1;
                    Ok(())
                } else {
                    tracing::warn!("circuit breaker probe budget exhausted, rejecting call");
                    Err(ExecutionError::CircuitOpen { remaining: Duration::ZERO })
                }
            }
        }
    }

    fn record(&self, is_failure: bool) {
        let mut inner = self.shared.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.failures.push(is_failure);
                if is_failure && inner.failures.hits() >= self.shared.failure_threshold.n {
                    inner.state = BreakerState::Open;
                    inner.opened_at_millis = self.shared.clock.now_millis();
                    inner.failures.clear();
                    inner.successes.clear();
                    inner.probes = 0;
                    tracing::error!(
                        n = self.shared.failure_threshold.n,
                        m = self.shared.failure_threshold.m,
                        "circuit breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.probes = inner.probes.saturating_sub(1);
                if is_failure {
                    inner.state = BreakerState::Open;
                    inner.opened_at_millis = self.shared.clock.now_millis();
                    inner.successes.clear();
                    inner.probes = 0;
                    tracing::warn!("circuit breaker probe failed, reopening");
                } else {
                    inner.successes.push(true);
                    if inner.successes.hits() >= self.shared.success_threshold.n {
                        inner.state = BreakerState::Closed;
                        inner.failures.clear();
                        inner.successes.clear();
                        inner.probes = 0;
                        tracing::info!("circuit breaker closed");
                    }
                }
            }
            // An attempt admitted earlier finished after the breaker reopened;
            // its outcome no longer affects the statistics.
            BreakerState::Open => {}
        }
    }
}

impl<T, E> PolicyExecutor<T, E> for CircuitBreaker<T, E> {
    fn before_attempt(&self, _ctx: &ExecutionContext<T, E>) -> Admission<E> {
        match self.try_acquire() {
            Ok(()) => Admission::Admit,
            Err(err) => Admission::Reject(err),
        }
    }

    fn on_outcome(&self, _ctx: &ExecutionContext<T, E>, outcome: Outcome<T, E>) -> Outcome<T, E> {
        let is_failure = (self.shared.classifier)(outcome.result(), outcome.failure());
        self.record(is_failure);
        outcome
    }
}

/// Builder for [`CircuitBreaker`]; validates eagerly.
pub struct CircuitBreakerBuilder<T, E> {
    failure_threshold: Threshold,
    success_threshold: Threshold,
    delay: Duration,
    classifier: Classifier<T, E>,
    clock: Arc<dyn Clock>,
}

impl<T, E> CircuitBreakerBuilder<T, E> {
    pub fn new() -> Self {
        Self {
            failure_threshold: Threshold { n: 1, m: 1 },
            success_threshold: Threshold { n: 1, m: 1 },
            delay: Duration::from_secs(60),
            classifier: Arc::new(|_, failure| failure.is_some()),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Open after `n` failures among the last `m` outcomes.
    pub fn failure_threshold(mut self, n: u32, m: u32) -> Result<Self, ConfigError> {
        self.failure_threshold = Threshold::validate(n, m)?;
        Ok(self)
    }

    /// Close after `n` successes among the last `m` probes. `m` is also the
    /// number of probes admitted concurrently while half-open.
    pub fn success_threshold(mut self, n: u32, m: u32) -> Result<Self, ConfigError> {
        self.success_threshold = Threshold::validate(n, m)?;
        Ok(self)
    }

    /// Cooldown before an open breaker admits its first probe.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Override outcome classification. The predicate returns `true` when the
    /// outcome counts as a failure; the default counts any failure and no
    /// returned value.
    pub fn failure_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) -> bool + Send + Sync + 'static,
    {
        self.classifier = Arc::new(predicate);
        self
    }

    /// Override the time source, for deterministic tests.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> CircuitBreaker<T, E> {
        CircuitBreaker {
            shared: Arc::new(Shared {
                failure_threshold: self.failure_threshold,
                success_threshold: self.success_threshold,
                delay: self.delay,
                classifier: self.classifier,
                clock: self.clock,
                inner: Mutex::new(Inner {
                    state: BreakerState::Closed,
                    failures: OutcomeWindow::new(self.failure_threshold.m),
                    successes: OutcomeWindow::new(self.success_threshold.m),
                    opened_at_millis: 0,
                    probes: 0,
                }),
            }),
        }
    }
}

impl<T, E> Default for CircuitBreakerBuilder<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}
