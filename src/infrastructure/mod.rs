//! Infrastructure layer.
//!
//! Provides the streaming engine itself: resilience primitives, the stream
//! multiplexer, client coordination and configuration. Nothing here knows
//! the exchange's wire schema beyond the combined-stream envelope.
//!
//! # Submodules
//!
//! - [`config`] - Configuration loading and validation
//! - [`task`] - Cancellable and retrying background tasks
//! - [`watchdog`] - Idle-time failure detection
//! - [`stream`] - Stream-name multiplexer and message buffering
//! - [`manager`] - Typed client coordination

pub mod config;
pub mod manager;
pub mod stream;
pub mod task;
pub mod watchdog;

pub use manager::ClientManager;
pub use stream::StreamMultiplexer;
pub use task::{RetryTaskController, TaskController, TaskEvent};
pub use watchdog::WatchdogTimer;
