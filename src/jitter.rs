//! Jitter applied on top of a computed delay to spread retry storms.
//!
//! Both strategies randomize symmetrically around the base delay: `Absolute`
//! within `[delay - j, delay + j]`, `Relative` within
//! `[delay * (1 - f), delay * (1 + f)]`. Results clamp at zero and the RNG is
//! injectable for deterministic tests.

use crate::ConfigError;
use rand::Rng;
use std::time::Duration;

/// Jitter strategy for randomizing retry delays.
#[derive(Debug, Clone, PartialEq)]
pub enum Jitter {
    /// Use the exact computed delay.
    None,
    /// Uniform offset within plus-or-minus a fixed duration.
    Absolute(Duration),
    /// Uniform offset within plus-or-minus a fraction of the delay.
    /// The factor lies in `[0, 1]`.
    Relative(f64),
}

impl Jitter {
    /// Jitter by up to `amount` either side of the delay.
    pub fn absolute(amount: Duration) -> Self {
        Jitter::Absolute(amount)
    }

    /// Jitter by up to `factor` of the delay either side of it.
    pub fn relative(factor: f64) -> Result<Self, ConfigError> {
        if !factor.is_finite() || !(0.0..=1.0).contains(&factor) {
            return Err(ConfigError::InvalidJitterFactor(factor));
        }
        Ok(Jitter::Relative(factor))
    }

    /// Randomize `delay` with the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rand::rng())
    }

    /// Randomize `delay` with an injected RNG.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let spread = match self {
            Jitter::None => return delay,
            Jitter::Absolute(amount) => *amount,
            Jitter::Relative(factor) => delay.mul_f64(*factor),
        };
        if spread.is_zero() {
            return delay;
        }

        let base = saturating_nanos(delay);
        let spread = saturating_nanos(spread);
        let lo = base.saturating_sub(spread);
        let hi = base.saturating_add(spread);
        Duration::from_nanos(rng.random_range(lo..=hi))
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    duration.as_nanos().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn none_returns_exact_delay() {
        assert_eq!(Jitter::None.apply(Duration::from_secs(1)), Duration::from_secs(1));
    }

    #[test]
    fn absolute_stays_within_band() {
        let jitter = Jitter::absolute(Duration::from_millis(20));
        let delay = Duration::from_millis(100);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let jittered = jitter.apply_with_rng(delay, &mut rng);
            assert!(jittered >= Duration::from_millis(80));
            assert!(jittered <= Duration::from_millis(120));
        }
    }

    #[test]
    fn absolute_clamps_at_zero() {
        let jitter = Jitter::absolute(Duration::from_millis(500));
        let delay = Duration::from_millis(100);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let jittered = jitter.apply_with_rng(delay, &mut rng);
            assert!(jittered <= Duration::from_millis(600));
        }
    }

    #[test]
    fn relative_stays_within_band() {
        let jitter = Jitter::relative(0.25).unwrap();
        let delay = Duration::from_millis(200);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let jittered = jitter.apply_with_rng(delay, &mut rng);
            assert!(jittered >= Duration::from_millis(150));
            assert!(jittered <= Duration::from_millis(250));
        }
    }

    #[test]
    fn relative_factor_is_validated() {
        assert!(Jitter::relative(0.0).is_ok());
        assert!(Jitter::relative(1.0).is_ok());
        assert!(matches!(Jitter::relative(1.5), Err(ConfigError::InvalidJitterFactor(_))));
        assert!(matches!(Jitter::relative(-0.1), Err(ConfigError::InvalidJitterFactor(_))));
        assert!(matches!(Jitter::relative(f64::NAN), Err(ConfigError::InvalidJitterFactor(_))));
    }

    #[test]
    fn zero_spread_is_a_no_op() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            Jitter::absolute(Duration::ZERO).apply_with_rng(Duration::from_millis(50), &mut rng),
            Duration::from_millis(50)
        );
        assert_eq!(
            Jitter::relative(0.0)
                .unwrap()
                .apply_with_rng(Duration::from_millis(50), &mut rng),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn zero_delay_with_relative_jitter_stays_zero() {
        let jitter = Jitter::relative(0.5).unwrap();
        assert_eq!(jitter.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn huge_durations_do_not_panic() {
        let jitter = Jitter::absolute(Duration::from_secs(u64::MAX / 2));
        let mut rng = StdRng::seed_from_u64(99);
        let _ = jitter.apply_with_rng(Duration::from_secs(u64::MAX / 2), &mut rng);
    }
}
