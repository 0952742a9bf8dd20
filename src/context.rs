//! Per-execution state shared with policies and user operations.

use crate::ExecutionError;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cooperative cancellation token.
///
/// Clones share the flag. `cancel` wakes any in-progress synchronous wait;
/// running operations are never forcibly stopped, but they can observe the
/// flag through the execution context and exit early.
#[derive(Clone)]
pub struct Cancellation {
    inner: Arc<CancelState>,
}

struct CancelState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl Cancellation {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self { inner: Arc::new(CancelState { cancelled: Mutex::new(false), wake: Condvar::new() }) }
    }

    /// Set the flag and wake any waiter. Returns `true` if this call was the
    /// one that set it.
    pub fn cancel(&self) -> bool {
        let mut cancelled = self.inner.cancelled.lock().unwrap();
        let newly = !*cancelled;
        *cancelled = true;
        self.inner.wake.notify_all();
        newly
    }

    /// Whether the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().unwrap()
    }

    /// Block the calling thread for `duration` or until cancelled, whichever
    /// comes first. Returns `true` if the wait ended by cancellation.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock().unwrap();
        loop {
            if *cancelled {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _timeout) =
                self.inner.wake.wait_timeout(cancelled, deadline - now).unwrap();
            cancelled = guard;
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellation").field("cancelled", &self.is_cancelled()).finish()
    }
}

/// Mutable record of one execution: attempt count, timings, and the most
/// recent attempt's outcome.
///
/// The runner owns the context; policies and contextual operations see it
/// through a shared borrow, so they can read but never rewrite history.
pub struct ExecutionContext<T, E> {
    start: Option<Instant>,
    attempts: u32,
    last_result: Option<T>,
    last_failure: Option<ExecutionError<E>>,
    cancellation: Cancellation,
}

impl<T, E> ExecutionContext<T, E> {
    pub(crate) fn new(cancellation: Cancellation) -> Self {
        Self { start: None, attempts: 0, last_result: None, last_failure: None, cancellation }
    }

    /// Number of attempts performed so far. Increments exactly once per inner
    /// invocation, before the operation runs.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wall-clock time elapsed since the first attempt began. Zero before the
    /// first attempt.
    pub fn elapsed(&self) -> Duration {
        self.start.map(|s| s.elapsed()).unwrap_or(Duration::ZERO)
    }

    /// The most recent attempt's value, if it produced one.
    pub fn last_result(&self) -> Option<&T> {
        self.last_result.as_ref()
    }

    /// The most recent attempt's failure, if it produced one.
    pub fn last_failure(&self) -> Option<&ExecutionError<E>> {
        self.last_failure.as_ref()
    }

    /// Whether the execution has been cancelled. Live, not a snapshot:
    /// cooperative operations poll this to exit early.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The execution's cancellation token.
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Stamp the start time on the first attempt and bump the counter.
    pub(crate) fn begin_attempt(&mut self) {
        if self.start.is_none() {
            self.start = Some(Instant::now());
        }
        self.attempts += 1;
    }
}

impl<T: Clone, E: Clone> ExecutionContext<T, E> {
    /// Record the attempt's outcome for later inspection by predicates,
    /// fallbacks, and contextual operations.
    pub(crate) fn record(&mut self, result: Option<&T>, failure: Option<&ExecutionError<E>>) {
        self.last_result = result.cloned();
        self.last_failure = failure.cloned();
    }
}

impl<T, E> fmt::Debug for ExecutionContext<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("attempts", &self.attempts)
            .field("elapsed", &self.elapsed())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
