//! feedmux - resilient multiplexing client for named market-data streams.
//!
//! Many typed consumers share one exchange connection. The engine keeps the
//! connection's stream set equal to the union of everything subscribed,
//! reconnects with a delay when the socket fails, restarts a feed that goes
//! silent and routes every inbound message to the observers of its stream.
//!
//! # Architecture
//!
//! - **`infrastructure::task`** - `TaskController` and the never-giving-up
//!   `RetryTaskController`
//! - **`infrastructure::watchdog`** - `WatchdogTimer` silence detection
//! - **`infrastructure::stream`** - `StreamMultiplexer` and the ordered
//!   `QueuedMessageBuffer`
//! - **`infrastructure::manager`** - `ClientManager` binding a typed client
//!   to the multiplexer
//! - **`application::cache`** - `OrderBookCache` kept in sync from depth diffs
//! - **`adapter::binance`** - WebSocket transport, REST snapshots and typed
//!   depth/trade clients
//!
//! # Modules
//!
//! - [`domain`] - Exchange-agnostic types: stream names, symbols, order books, events
//! - [`port`] - Trait seams between the engine and its collaborators
//! - [`error`] - Error types for the crate
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use feedmux::adapter::binance::{TradeClient, WebSocketTransport};
//! use feedmux::domain::Symbol;
//! use feedmux::infrastructure::config::Config;
//! use feedmux::infrastructure::{ClientManager, RetryTaskController, StreamMultiplexer};
//!
//! # async fn run() -> feedmux::error::Result<()> {
//! let config = Config::default();
//! let multiplexer = Arc::new(StreamMultiplexer::new(
//!     Arc::new(WebSocketTransport::new()),
//!     url::Url::parse(&config.endpoint.ws_url)?,
//!     config.stream.clone(),
//! ));
//! let controller = Arc::new(RetryTaskController::new(config.retry.clone()));
//! let trades = ClientManager::new(
//!     Arc::new(TradeClient::new()),
//!     multiplexer,
//!     controller,
//!     &config.watchdog,
//! );
//! trades.subscribe(&Symbol::new("BTCUSDT"), None).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
