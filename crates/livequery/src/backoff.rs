//! Reconnect delays: capped exponential growth with full jitter.
//!
//! The delay before reconnect attempt `n` is drawn uniformly from
//! `[0, min(2^n - 1 seconds, ceiling))`, so it is never negative and always
//! strictly below the ceiling however many attempts have failed.

use std::time::Duration;

use rand::Rng;

/// Reconnect delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectBackoff {
    ceiling: Duration,
}

impl ReconnectBackoff {
    /// A schedule whose delays stay strictly below `ceiling`.
    pub fn new(ceiling: Duration) -> Self {
        Self { ceiling }
    }

    /// The exclusive upper bound of the delay for `attempt` (1-based).
    pub fn upper_bound(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32);
        let growth_ms = ((1u64 << exponent) - 1).saturating_mul(1000);
        Duration::from_millis(growth_ms).min(self.ceiling)
    }

    /// A jittered delay for `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let bound = u64::try_from(self.upper_bound(attempt).as_millis()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..bound))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn delays_stay_below_the_ceiling() {
        let ceiling = Duration::from_secs(30);
        let backoff = ReconnectBackoff::new(ceiling);
        for attempt in 1..=50 {
            for _ in 0..20 {
                let delay = backoff.delay(attempt);
                assert!(delay < ceiling, "attempt {attempt} waited {delay:?}");
            }
        }
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1_000)]
    #[case(3, 7_000)]
    #[case(5, 30_000)]
    #[case(50, 30_000)]
    fn upper_bound_grows_then_caps(#[case] attempt: u32, #[case] expected_ms: u64) {
        let backoff = ReconnectBackoff::new(Duration::from_secs(30));
        assert_eq!(backoff.upper_bound(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn zero_bound_means_no_wait() {
        let backoff = ReconnectBackoff::new(Duration::ZERO);
        assert_eq!(backoff.delay(4), Duration::ZERO);
    }
}
