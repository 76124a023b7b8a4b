//! Reconnection, watchdog and multiplexer configuration.

use std::time::Duration;

use serde::Deserialize;

/// Delay schedule of the retry loop that keeps a stream session alive.
///
/// A `backoff_multiplier` of 1.0 (the default) gives a fixed delay. Larger
/// values grow the delay per failed run up to `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryConfig {
    /// Delay before the next run (milliseconds).
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Cap on the grown delay (milliseconds).
    #[serde(default = "default_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

const fn default_delay_ms() -> u64 {
    5_000
}

const fn default_backoff_multiplier() -> f64 {
    1.0
}

impl RetryConfig {
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// True when delays grow between consecutive failures.
    #[must_use]
    pub fn uses_backoff(&self) -> bool {
        self.backoff_multiplier > 1.0 && self.max_delay_ms > self.delay_ms
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_delay_ms: default_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Silence detection for a subscribed client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchdogConfig {
    /// Seconds without a message before the session is restarted.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// How often the elapsed time is checked (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

const fn default_interval_secs() -> u64 {
    3_600
}

const fn default_poll_interval_ms() -> u64 {
    100
}

impl WatchdogConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Stream multiplexer settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    /// Quiet period after a subscription change before the session is
    /// reopened with the new stream set (milliseconds).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Reject unsubscribing from a stream that was never subscribed.
    #[serde(default)]
    pub strict_unsubscribe: bool,
    /// Capacity of the raw message broadcast channel.
    #[serde(default = "default_raw_channel_capacity")]
    pub raw_channel_capacity: usize,
}

const fn default_debounce_ms() -> u64 {
    100
}

const fn default_raw_channel_capacity() -> usize {
    1_024
}

impl StreamConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            strict_unsubscribe: false,
            raw_channel_capacity: default_raw_channel_capacity(),
        }
    }
}
