//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests. Timings are
//! short so paused-clock tests advance quickly.

use url::Url;

use crate::infrastructure::config::{RetryConfig, StreamConfig, WatchdogConfig};

/// Fixed 50ms retry delay.
pub fn retry() -> RetryConfig {
    RetryConfig {
        delay_ms: 50,
        max_delay_ms: 50,
        backoff_multiplier: 1.0,
    }
}

/// 20ms debounce, lenient unsubscribe.
pub fn stream() -> StreamConfig {
    StreamConfig {
        debounce_ms: 20,
        strict_unsubscribe: false,
        raw_channel_capacity: 64,
    }
}

/// Like [`stream`] with strict unsubscribe checks.
pub fn strict_stream() -> StreamConfig {
    StreamConfig {
        strict_unsubscribe: true,
        ..stream()
    }
}

/// Watchdog with the given interval and a 10ms poll tick.
pub fn watchdog(interval_secs: u64) -> WatchdogConfig {
    WatchdogConfig {
        interval_secs,
        poll_interval_ms: 10,
    }
}

/// WebSocket base URL used by the mock transport.
pub fn ws_url() -> Url {
    Url::parse("wss://stream.test:9443").unwrap()
}
