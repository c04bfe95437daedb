use std::time::Duration;

/// Bounded retry budget for the statistics update path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Policy that retries immediately, mostly for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Exponential backoff with full jitter for the given (1-based) failed attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay);

        if ceiling.is_zero() {
            return ceiling;
        }

        let jitter_ms = rand::random::<u64>() % (ceiling.as_millis() as u64 + 1);
        Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_max_delay() {
        let policy = RetryPolicy::new(10, Duration::from_millis(10), Duration::from_millis(80));
        for attempt in 1..=10 {
            assert!(policy.backoff(attempt) <= Duration::from_millis(80));
        }
    }

    #[test]
    fn first_backoff_is_bounded_by_base_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(500));
        for _ in 0..50 {
            assert!(policy.backoff(1) <= Duration::from_millis(10));
        }
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let policy = RetryPolicy::immediate(4);
        assert_eq!(policy.backoff(3), Duration::ZERO);
        assert_eq!(policy.max_attempts, 4);
    }

    #[test]
    fn at_least_one_attempt_is_allowed() {
        assert_eq!(RetryPolicy::immediate(0).max_attempts, 1);
    }
}
