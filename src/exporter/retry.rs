use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total send attempts per batch, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Scales each delay by a random factor in `[0.5, 1.5)`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

/// Exponential backoff schedule for a single batch: `base_delay * 2^attempt`,
/// capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Number of attempts to make; never less than one.
    pub fn attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Whether another attempt follows the failed attempt `attempt` (0-based).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.attempts()
    }

    /// Delay to wait after the failed attempt `attempt` (0-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_millis = self.config.base_delay.as_millis() as u64;
        let multiplier = 2_u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let capped =
            Duration::from_millis(base_millis.saturating_mul(multiplier)).min(self.config.max_delay);

        if self.config.jitter {
            apply_jitter(capped).min(self.config.max_delay)
        } else {
            capped
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let jitter_factor = rand::rng().random_range(0.5..1.5);
    Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_schedule() {
        let policy = RetryPolicy::new(RetryConfig::default());

        assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(4));
        assert_eq!(policy.calculate_delay(10), Duration::from_secs(30));
        assert_eq!(policy.calculate_delay(200), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_respects_cap() {
        let policy = RetryPolicy::new(RetryConfig {
            base_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(25),
            jitter: true,
            ..Default::default()
        });
        for attempt in 0..5 {
            assert!(policy.calculate_delay(attempt) <= Duration::from_secs(25));
        }
    }

    #[test]
    fn test_attempt_accounting() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 0,
            ..Default::default()
        });
        assert_eq!(policy.attempts(), 1);
        assert!(!policy.should_retry(0));

        let policy = RetryPolicy::new(RetryConfig::default());
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }
}
