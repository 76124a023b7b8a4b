//! Infrastructure configuration modules.

pub mod feed;
pub mod logging;
pub mod settings;
pub mod stream;

pub use feed::{DepthConfig, EndpointConfig, TradeConfig, SNAPSHOT_LIMITS};
pub use logging::{LogFormat, LoggingConfig};
pub use settings::Config;
pub use stream::{RetryConfig, StreamConfig, WatchdogConfig};
