//! Interruptible waiting between attempts on the caller's thread.
//!
//! The synchronous runner honors inter-attempt delays by blocking; the
//! abstraction exists so tests run without real time passing.

use crate::Cancellation;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration passed.
    Elapsed,
    /// Cancellation woke the wait before the duration passed.
    Interrupted,
}

/// Blocking, interruptible wait used by the synchronous runner.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    /// Wait for `duration` or until `cancellation` fires.
    fn sleep(&self, duration: Duration, cancellation: &Cancellation) -> WaitOutcome;
}

/// Production sleeper: parks the caller thread on the cancellation token so
/// `cancel` wakes it immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingSleeper;

impl Sleeper for BlockingSleeper {
    fn sleep(&self, duration: Duration, cancellation: &Cancellation) -> WaitOutcome {
        if cancellation.wait_timeout(duration) {
            WaitOutcome::Interrupted
        } else {
            WaitOutcome::Elapsed
        }
    }
}

/// Test sleeper that never blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration, cancellation: &Cancellation) -> WaitOutcome {
        if cancellation.is_cancelled() {
            WaitOutcome::Interrupted
        } else {
            WaitOutcome::Elapsed
        }
    }
}

/// Test sleeper that records every requested duration without blocking.
#[derive(Debug, Clone)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self { calls: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Durations requested so far, in order.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Default for TrackingSleeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Sleeper for TrackingSleeper {
    fn sleep(&self, duration: Duration, cancellation: &Cancellation) -> WaitOutcome {
        self.calls.lock().unwrap().push(duration);
        if cancellation.is_cancelled() {
            WaitOutcome::Interrupted
        } else {
            WaitOutcome::Elapsed
        }
    }
}
