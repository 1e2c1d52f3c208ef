//! Reconnect timing for the atom feed
//!
//! The delay grows quadratically with the attempt number and is capped:
//! `delay(n) = min(n², max_delay)` seconds, so 1s, 4s, 9s, ... 100s.

use radix_ledger_core::config::DeliveryConfig;
use std::time::Duration;

/// Retry policy for transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures before giving up
    pub max_attempts: u32,

    /// Cap on a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

impl RetryPolicy {
    /// Build from the delivery section of the config
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            max_delay: Duration::from_secs(config.max_retry_delay_secs),
        }
    }

    /// Delay before reconnecting after the `attempt`-th consecutive failure
    pub fn delay(&self, attempt: u32) -> Duration {
        let squared = u64::from(attempt).saturating_mul(u64::from(attempt));
        Duration::from_secs(squared).min(self.max_delay)
    }

    /// Whether another attempt is allowed after `failures` consecutive failures
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_quadratic_and_capped() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(9));
        assert_eq!(policy.delay(10), Duration::from_secs(100));
        assert_eq!(policy.delay(11), Duration::from_secs(100));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(100));
    }

    #[test]
    fn test_attempts_are_bounded() {
        let policy = RetryPolicy {
            max_attempts: 3,
            max_delay: Duration::from_secs(5),
        };

        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay(3), Duration::from_secs(5));
    }
}
