use std::time::Duration;

use taskflow_core::error::NodeError;
use taskflow_core::executor::types::RetryConfig;
use taskflow_core::executor::RetryStrategyPlugin;

/// `base * 2^(attempt - 1)`, capped at `max_delay_ms`. The first retry waits `base`.
pub struct ExponentialBackoffPlugin {
    config: RetryConfig,
}

/// `base * attempt`, capped at `max_delay_ms`.
pub struct LinearRetryPlugin {
    config: RetryConfig,
}

impl ExponentialBackoffPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryStrategyPlugin for ExponentialBackoffPlugin {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32, _error: &NodeError) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }
        let exp = 1u64 << attempt.saturating_sub(1).min(30);
        let delay = self.config.base_delay_ms.saturating_mul(exp);
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32, _error: &NodeError) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }
        let multiplier = attempt.max(1) as u64;
        let delay = self.config.base_delay_ms.saturating_mul(multiplier);
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Missing inputs will not appear by retrying.
    fn is_fatal_error(&self, error: &NodeError) -> bool {
        error.is_fatal() || matches!(error, NodeError::MissingInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err() -> NodeError {
        NodeError::failed("flaky upstream")
    }

    #[test]
    fn test_exponential_backoff() {
        let cfg = RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            max_attempts: 3,
            strategy: "exponential-backoff".to_string(),
        };
        let plugin = ExponentialBackoffPlugin::new(cfg);
        assert_eq!(plugin.next_delay(1, &err()).unwrap().as_millis(), 100);
        assert_eq!(plugin.next_delay(2, &err()).unwrap().as_millis(), 200);
        assert_eq!(plugin.next_delay(3, &err()), None);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let cfg = RetryConfig {
            base_delay_ms: 400,
            max_delay_ms: 1000,
            max_attempts: 10,
            strategy: "exponential-backoff".to_string(),
        };
        let plugin = ExponentialBackoffPlugin::new(cfg);
        assert_eq!(plugin.next_delay(5, &err()).unwrap().as_millis(), 1000);
    }

    #[test]
    fn test_linear_backoff() {
        let cfg = RetryConfig {
            base_delay_ms: 50,
            max_delay_ms: 200,
            max_attempts: 4,
            strategy: "linear".to_string(),
        };
        let plugin = LinearRetryPlugin::new(cfg);
        assert_eq!(plugin.next_delay(1, &err()).unwrap().as_millis(), 50);
        assert_eq!(plugin.next_delay(3, &err()).unwrap().as_millis(), 150);
        assert_eq!(plugin.next_delay(4, &err()), None);
    }

    #[test]
    fn test_fatal_errors_are_not_retried() {
        let plugin = LinearRetryPlugin::new(RetryConfig::default());
        assert!(plugin.should_retry(1, &err()));
        assert!(!plugin.should_retry(1, &NodeError::Timeout(10)));
        assert!(!plugin.should_retry(1, &NodeError::MissingInput("a.x".into())));
        assert!(!plugin.should_retry(3, &err()));

        let exp = ExponentialBackoffPlugin::new(RetryConfig::default());
        assert!(exp.should_retry(2, &NodeError::MissingInput("a.x".into())));
    }
}
