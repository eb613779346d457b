//! Exponential backoff for flush retries.
//!
//! Backoff formula: min(max_delay, base_delay * 2^attempt) + jitter

use crate::config::ExecutorConfig;
use std::time::Duration;

/// Backoff behavior for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay for first retry
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Whether to add jitter (randomness) to delays
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a policy with custom settings.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Derive the policy from executor configuration.
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.retry_backoff_base_ms),
            max_delay: Duration::from_millis(config.retry_backoff_max_ms),
            jitter: true,
        }
    }

    /// Disable jitter (for testing).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Calculate the backoff delay for a given attempt.
    ///
    /// Uses exponential backoff: min(max_delay, base_delay * 2^attempt)
    /// Optionally adds jitter (±25%) to prevent thundering herd.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped_delay_ms = delay_ms.min(max_ms);

        let final_delay_ms = if self.jitter {
            let jitter_range = capped_delay_ms / 4;
            let jitter = (std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos() as u64)
                % (jitter_range * 2 + 1);
            capped_delay_ms.saturating_sub(jitter_range) + jitter
        } else {
            capped_delay_ms
        };

        Duration::from_millis(final_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert!(policy.jitter);
    }

    #[test]
    fn test_from_config() {
        let config = ExecutorConfig {
            retry_backoff_base_ms: 50,
            retry_backoff_max_ms: 2000,
            ..ExecutorConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_calculate_delay_exponential() {
        let policy =
            RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(30)).without_jitter();

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_calculate_delay_caps_at_max() {
        let policy =
            RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1)).without_jitter();

        assert_eq!(policy.calculate_delay(10), Duration::from_millis(1000));
        assert_eq!(policy.calculate_delay(20), Duration::from_millis(1000));
    }

    #[test]
    fn test_calculate_delay_with_jitter() {
        let policy = RetryPolicy::new(Duration::from_millis(1000), Duration::from_secs(30));

        // With jitter, delay should be within ±25% of base
        let delay = policy.calculate_delay(0);
        assert!(delay >= Duration::from_millis(750));
        assert!(delay <= Duration::from_millis(1250));
    }

    #[test]
    fn test_calculate_delay_handles_overflow() {
        let policy =
            RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(30)).without_jitter();

        // Very high attempt numbers should not overflow, just cap at max
        assert_eq!(policy.calculate_delay(50), Duration::from_secs(30));
        assert_eq!(policy.calculate_delay(100), Duration::from_secs(30));
    }
}
