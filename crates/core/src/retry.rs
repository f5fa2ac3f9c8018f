//! Bounded exponential backoff used for clip uploads.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for a bounded retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Base delay after the `failed_attempts`-th failure (1-based).
    ///
    /// Clamped to [`RetryPolicy::max_delay`].
    pub fn base_delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(ms.min(self.max_delay.as_millis() as f64) as u64)
    }

    /// Base delay with up to 25% random jitter subtracted, so processes that
    /// failed together do not retry in lockstep.
    pub fn jittered_delay(&self, failed_attempts: u32) -> Duration {
        let base = self.base_delay(failed_attempts);
        let quarter = base.as_millis() as u64 / 4;
        if quarter == 0 {
            return base;
        }
        let jitter = rand::rng().random_range(0..=quarter);
        base - Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_clamps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(400));
        assert_eq!(policy.base_delay(4), Duration::from_millis(500));
        assert_eq!(policy.base_delay(40), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_quarter() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.jittered_delay(2);
            assert!(d <= Duration::from_millis(400));
            assert!(d >= Duration::from_millis(300));
        }
    }

    #[test]
    fn at_least_one_attempt() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(policy.attempts(), 1);
    }
}
