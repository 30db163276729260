use std::time::Duration;

/// Default delay before reconnecting after an unintentional closure.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Delay between a failed or dropped connection and the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Always wait the same amount of time.
    Fixed(Duration),
    /// Double the delay after each consecutive failure, up to `max`.
    Exponential { initial: Duration, max: Duration },
}

impl ReconnectPolicy {
    /// Returns the delay after `failures` consecutive failures (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        match *self {
            ReconnectPolicy::Fixed(delay) => delay,
            ReconnectPolicy::Exponential { initial, max } => {
                let exponent = failures.saturating_sub(1).min(16);
                initial.saturating_mul(1 << exponent).min(max)
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}
