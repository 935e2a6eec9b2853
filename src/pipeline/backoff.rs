use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff for queued entries.
///
/// After the n-th failed retry the entry waits `base_delay * 2^(n-1)`,
/// capped at `max_delay`. Reaching `max_attempts` failed retries parks
/// the entry as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Delay before the next retry, given how many retries have already failed.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }

        let exponent = (failed_attempts - 1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn is_exhausted(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..=7).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![0, 1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_delays_never_decrease_and_respect_ceiling() {
        let policy = BackoffPolicy::new(Duration::from_millis(750), Duration::from_secs(20), 10);
        let mut previous = Duration::ZERO;
        for attempt in 0..100 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous, "attempt {} went down", attempt);
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
        assert_eq!(previous, policy.max_delay);
    }

    #[test]
    fn test_huge_attempt_counts_do_not_overflow() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), DEFAULT_MAX_DELAY);
    }

    #[test]
    fn test_exhaustion() {
        let policy = BackoffPolicy::default();
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
        assert!(policy.is_exhausted(6));
    }

    #[test]
    fn test_at_least_one_attempt() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::ZERO, 0);
        assert_eq!(policy.max_attempts, 1);
    }
}
