use std::time::Duration;

/// Reconnect schedule for the persistent channel.
///
/// Reconnect attempt `n` waits `min(base_delay * 2^(n-1), max_delay)`;
/// once `max_failures` reconnect attempts have failed the session gives up
/// on pushes and polls every `poll_interval` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_failures: u32,
    pub poll_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_failures: 5,
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt`, counted from 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn should_poll(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_failures
    }
}
