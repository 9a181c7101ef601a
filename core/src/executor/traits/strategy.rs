use std::time::Duration;

use crate::error::NodeError;

/// Retry strategy plugin. `attempt` counts retries, starting at 1.
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn next_delay(&self, attempt: u32, error: &NodeError) -> Option<Duration>;
    /// Total attempts including the first one
    fn max_attempts(&self) -> u32;
    fn should_retry(&self, attempt: u32, error: &NodeError) -> bool {
        attempt < self.max_attempts() && !self.is_fatal_error(error)
    }
    fn is_fatal_error(&self, error: &NodeError) -> bool {
        error.is_fatal()
    }
}
