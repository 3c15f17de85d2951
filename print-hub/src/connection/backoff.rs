//! Exponential backoff with upward jitter
//!
//! delay(n) = min(base * 2^n * (1 + jitter), max), jitter in [0, 10%].
//! Jitter only ever lengthens the nominal delay, and 1.1 < 2, so successive
//! delays never decrease.

use rand::Rng;
use std::time::Duration;

/// Upper bound of the random stretch applied to each delay
pub const JITTER_RATIO: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    /// Attempts allowed before giving up
    pub max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
        }
    }

    /// `base * 2^attempt`, capped at `max`
    pub fn nominal(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay for `attempt` with a given jitter sample in `[0, 1)`
    pub fn delay_with(&self, attempt: u32, sample: f64) -> Duration {
        let stretch = 1.0 + JITTER_RATIO * sample.clamp(0.0, 1.0);
        self.nominal(attempt).mul_f64(stretch).min(self.max)
    }

    /// Delay for `attempt` with random jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let sample = rand::thread_rng().gen_range(0.0..1.0);
        self.delay_with(attempt, sample)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_doubles_then_caps() {
        let b = Backoff::new(Duration::from_millis(1000), Duration::from_millis(5000), 5);
        assert_eq!(b.nominal(0), Duration::from_millis(1000));
        assert_eq!(b.nominal(1), Duration::from_millis(2000));
        assert_eq!(b.nominal(2), Duration::from_millis(4000));
        assert_eq!(b.nominal(3), Duration::from_millis(5000));
        assert_eq!(b.nominal(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_four_attempts_non_decreasing_within_jitter() {
        let b = Backoff::new(Duration::from_millis(1000), Duration::from_millis(6000), 5);
        for _ in 0..200 {
            let delays: Vec<Duration> = (0..4).map(|n| b.delay(n)).collect();
            for pair in delays.windows(2) {
                assert!(pair[0] <= pair[1], "{:?}", delays);
            }
            for (n, d) in delays.iter().enumerate() {
                let nominal = b.nominal(n as u32);
                assert!(*d >= nominal);
                assert!(*d <= nominal.mul_f64(1.0 + JITTER_RATIO));
                assert!(*d <= b.max);
            }
        }
    }

    #[test]
    fn test_extreme_samples() {
        let b = Backoff::default();
        assert_eq!(b.delay_with(0, 0.0), Duration::from_millis(1000));
        assert_eq!(b.delay_with(0, 1.0), Duration::from_millis(1100));
        // the worst-case stretch of one step stays below the next step
        assert!(b.delay_with(1, 1.0) < b.delay_with(2, 0.0));
        // capped even at full stretch
        assert_eq!(b.delay_with(10, 1.0), Duration::from_secs(30));
    }

    #[test]
    fn test_exhausted() {
        let b = Backoff::default();
        assert!(!b.exhausted(4));
        assert!(b.exhausted(5));
    }
}
