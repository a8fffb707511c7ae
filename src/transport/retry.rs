//! Retry budget and backoff schedule

use std::time::Duration;

pub const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(1500);
const MAX_DELAY: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Wait before the next attempt after `failures` failed attempts:
    /// `min(base * failures², max)`
    #[must_use]
    pub fn delay_after(&self, failures: u32) -> Duration {
        self.base_delay
            .saturating_mul(failures.saturating_mul(failures))
            .min(self.max_delay)
    }
}
