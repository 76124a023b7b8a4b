//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings. Every
//! section is optional and falls back to its defaults.
//!
//! # Example
//!
//! ```no_run
//! use feedmux::infrastructure::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::Deserialize;
use url::Url;

use super::feed::{DepthConfig, EndpointConfig, TradeConfig, SNAPSHOT_LIMITS};
use super::logging::LoggingConfig;
use super::stream::{RetryConfig, StreamConfig, WatchdogConfig};
use crate::error::{ConfigError, Result};

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Exchange WebSocket and REST base URLs.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Delay between stream sessions after a failure or close.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Silence detection that forces a reconnect.
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Multiplexer tuning.
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub depth: DepthConfig,

    #[serde(default)]
    pub trade: TradeConfig,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        if self.endpoint.ws_url.is_empty() {
            return Err(ConfigError::MissingField { field: "ws_url" }.into());
        }
        if self.endpoint.api_url.is_empty() {
            return Err(ConfigError::MissingField { field: "api_url" }.into());
        }
        for (field, value) in [
            ("ws_url", &self.endpoint.ws_url),
            ("api_url", &self.endpoint.api_url),
        ] {
            if let Err(e) = Url::parse(value) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: e.to_string(),
                }
                .into());
            }
        }

        if self.retry.delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "delay_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.retry.max_delay_ms < self.retry.delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "max_delay_ms",
                reason: "must be >= delay_ms".to_string(),
            }
            .into());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier",
                reason: "must be >= 1.0".to_string(),
            }
            .into());
        }

        if self.watchdog.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "interval_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.watchdog.poll_interval_ms == 0
            || self.watchdog.poll_interval() >= self.watchdog.interval()
        {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_ms",
                reason: "must be greater than 0 and shorter than interval_secs".to_string(),
            }
            .into());
        }

        if self.stream.raw_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "raw_channel_capacity",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if !SNAPSHOT_LIMITS.contains(&self.depth.limit) {
            return Err(ConfigError::InvalidValue {
                field: "limit",
                reason: format!("must be one of {SNAPSHOT_LIMITS:?}"),
            }
            .into());
        }

        if self.depth.max_pending == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_pending",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
