use std::time::Duration;

use crate::config::settings::JobsConfig;

/// Job-level retry schedule: exponential growth bounded by a cap.
///
/// `delay(n) = min(base * multiplier^(n - 1), max)` where `n` is the number of
/// attempts already made (so the first retry waits `base`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            base,
            multiplier,
            max,
        }
    }

    /// Retries become due immediately. Used by one-shot runs and tests.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, 1.0, Duration::ZERO)
    }

    pub fn delay_for(&self, attempts: i32) -> Duration {
        let exponent = attempts.saturating_sub(1).clamp(0, 64);
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max.as_secs_f64();

        if !secs.is_finite() || secs >= cap {
            self.max
        } else if secs <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 2.0, Duration::from_secs(3600))
    }
}

impl From<&JobsConfig> for BackoffPolicy {
    fn from(config: &JobsConfig) -> Self {
        Self::new(
            Duration::from_secs(config.backoff_base_secs),
            config.backoff_multiplier,
            Duration::from_secs(config.backoff_max_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_retry_waits_base() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(2), Duration::from_secs(60));
        assert_eq!(policy.delay_for(3), Duration::from_secs(120));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(20), Duration::from_secs(3600));
        assert_eq!(policy.delay_for(i32::MAX), Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_attempts_treated_as_first() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), policy.delay_for(1));
    }

    #[test]
    fn test_immediate_policy() {
        assert_eq!(BackoffPolicy::immediate().delay_for(7), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn prop_delay_never_exceeds_cap(
            base in 0u64..600,
            multiplier in 1.0f64..10.0,
            cap in 0u64..86_400,
            attempts in 0i32..200,
        ) {
            let policy = BackoffPolicy::new(
                Duration::from_secs(base),
                multiplier,
                Duration::from_secs(cap),
            );
            prop_assert!(policy.delay_for(attempts) <= Duration::from_secs(cap));
        }

        #[test]
        fn prop_delay_is_monotonic(
            base in 1u64..600,
            multiplier in 1.0f64..4.0,
            attempts in 1i32..100,
        ) {
            let policy = BackoffPolicy::new(
                Duration::from_secs(base),
                multiplier,
                Duration::from_secs(3600),
            );
            prop_assert!(policy.delay_for(attempts) <= policy.delay_for(attempts + 1));
        }
    }
}
