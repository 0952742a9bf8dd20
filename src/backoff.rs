//! Delay schedules between attempts.
//!
//! Attempt semantics: `delay_for(n)` computes the wait after attempt `n`
//! completed, so retries start at `n = 1`. Attempt `0` (the initial call)
//! never waits. Computations that would overflow saturate at [`MAX_BACKOFF`].

use crate::ConfigError;
use rand::Rng;
use std::time::Duration;

/// Ceiling applied when a schedule overflows (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Delay schedule for retries.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed { delay: Duration },
    /// `base * factor^(n-1)` before retry `n`, optionally capped.
    Exponential { base: Duration, factor: f64, max: Option<Duration> },
    /// A fresh uniform draw from `[min, max]` before every retry.
    Random { min: Duration, max: Duration },
}

impl Backoff {
    /// Fixed delay schedule.
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Fixed { delay }
    }

    /// Exponential schedule doubling from `base`.
    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base, factor: 2.0, max: None }
    }

    /// Exponential schedule growing by `factor` from `base`.
    /// `factor` must be finite and at least 1.0.
    pub fn exponential_with_factor(base: Duration, factor: f64) -> Result<Self, ConfigError> {
        if !factor.is_finite() || factor < 1.0 {
            return Err(ConfigError::InvalidDelayFactor(factor));
        }
        Ok(Backoff::Exponential { base, factor, max: None })
    }

    /// Uniform random schedule over `[min, max]`.
    pub fn random(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidDelayRange { min, max });
        }
        Ok(Backoff::Random { min, max })
    }

    /// Cap an exponential schedule at `max`. The cap must be non-zero and at
    /// least the base delay; other schedules do not take a cap.
    pub fn with_max(mut self, max: Duration) -> Result<Self, ConfigError> {
        match &mut self {
            Backoff::Exponential { base, max: existing, .. } => {
                if max.is_zero() || max < *base {
                    return Err(ConfigError::InvalidDelayCap { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            Backoff::Fixed { .. } | Backoff::Random { .. } => Err(ConfigError::CapUnsupported),
        }
    }

    /// Delay after attempt `attempt` completed (1-based; 0 yields zero).
    /// Random schedules draw from the thread-local RNG.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_for_with_rng(attempt, &mut rand::rng())
    }

    /// Same as [`delay_for`](Self::delay_for) with an injected RNG, so tests
    /// of random schedules are deterministic.
    pub fn delay_for_with_rng<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        match self {
            Backoff::Fixed { delay } => *delay,
            Backoff::Exponential { base, factor, max } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let nanos = base.as_nanos() as f64 * factor.powi(exponent);
                let capped = if nanos.is_finite() {
                    nanos.min(MAX_BACKOFF.as_nanos() as f64)
                } else {
                    MAX_BACKOFF.as_nanos() as f64
                };
                let delay = Duration::from_nanos(capped as u64);
                max.map(|m| delay.min(m)).unwrap_or(delay)
            }
            Backoff::Random { min, max } => {
                let lo = saturating_nanos(*min);
                let hi = saturating_nanos(*max);
                if lo == hi {
                    return *min;
                }
                Duration::from_nanos(rng.random_range(lo..=hi))
            }
        }
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    duration.as_nanos().try_into().unwrap_or(u64::MAX)
}
