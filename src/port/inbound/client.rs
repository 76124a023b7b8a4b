//! Typed client and observer ports.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::{event::StreamEvent, id::StreamName};
use crate::error::Result;

/// Callback invoked with each typed event a client raises.
///
/// Identity is the `Arc` allocation: registering the same `Arc` twice is a
/// no-op, and unsubscribing needs a clone of the registered `Arc`.
pub type EventCallback = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Receives raw `(stream, json)` messages routed by the multiplexer.
///
/// An `Err` (or a panic) is logged by the dispatcher and never stops delivery
/// to other observers.
pub trait StreamObserver: Send + Sync {
    fn on_message(&self, stream: &StreamName, data: &Value) -> Result<()>;
}

impl<F> StreamObserver for F
where
    F: Fn(&StreamName, &Value) -> Result<()> + Send + Sync,
{
    fn on_message(&self, stream: &StreamName, data: &Value) -> Result<()> {
        self(stream, data)
    }
}

/// A typed decoder that turns raw stream messages into [`StreamEvent`]s.
///
/// The client tracks which stream names its topics need; the
/// [`ClientManager`](crate::infrastructure::manager::ClientManager) diffs
/// [`observed_streams`](Self::observed_streams) around each
/// subscribe/unsubscribe to keep the multiplexer in lockstep.
pub trait StreamClient: Send + Sync + 'static {
    /// What callers subscribe to (a symbol, a symbol plus options, ...).
    type Topic: Send + Sync;

    /// Stream names this client currently needs.
    fn observed_streams(&self) -> BTreeSet<StreamName>;

    /// Register interest in `topic`.
    ///
    /// With `None`, the topic's stream is observed without a dedicated
    /// callback; its events only reach the client's broadcast listeners.
    fn subscribe(&self, topic: &Self::Topic, callback: Option<EventCallback>) -> Result<()>;

    /// Drop interest in `topic` registered with `callback` (or the
    /// callback-less interest for `None`). Unknown registrations are a no-op.
    fn unsubscribe(&self, topic: &Self::Topic, callback: Option<&EventCallback>) -> Result<()>;

    /// Decode one message and raise the resulting event.
    fn handle_message(&self, stream: &StreamName, data: &Value) -> Result<()>;
}
