//! Monotonic time source consumed by the circuit breaker.

use std::time::Instant;

/// Thread-safe monotonic time source.
///
/// Readings are milliseconds since the implementer's own epoch; only
/// differences between readings from the same instance (or its clones) are
/// meaningful. Implementations must be monotonic, safe to call concurrently,
/// and must saturate rather than wrap on overflow.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds elapsed since this clock's epoch.
    fn now_millis(&self) -> u64;
}

/// Production clock backed by `Instant::now()`.
///
/// Clones share the epoch captured at creation, so readings from clones are
/// directly comparable. Independently created instances are not.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Capture the epoch now.
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    /// Saturates to `u64::MAX` on the theoretical overflow.
    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
