//! Typed stream clients.
//!
//! - [`DepthClient`] - `<symbol>@depth[@100ms]` diffs as [`DepthUpdate`](crate::domain::DepthUpdate)s
//! - [`TradeClient`] - `<symbol>@trade` prints as [`Trade`](crate::domain::Trade)s
//!
//! Both share the callback bookkeeping in [`CallbackRegistry`].

mod depth;
mod trade;

pub use depth::{DepthClient, DepthTopic, UpdateSpeed};
pub use trade::TradeClient;

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::{event::StreamEvent, id::StreamName};
use crate::infrastructure::task::panic_message;
use crate::port::EventCallback;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct Interest {
    callbacks: Vec<EventCallback>,
    /// Subscribed without a callback.
    observe_all: bool,
}

impl Interest {
    fn is_empty(&self) -> bool {
        self.callbacks.is_empty() && !self.observe_all
    }
}

fn same_callback(a: &EventCallback, b: &EventCallback) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// Per-stream callback sets plus a broadcast of every decoded event.
///
/// A stream stays observed while it has at least one callback or a
/// callback-less interest.
pub struct CallbackRegistry {
    streams: Mutex<BTreeMap<StreamName, Interest>>,
    events: broadcast::Sender<StreamEvent>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            streams: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    #[must_use]
    pub fn observed(&self) -> BTreeSet<StreamName> {
        self.streams.lock().keys().cloned().collect()
    }

    pub fn add(&self, stream: StreamName, callback: Option<EventCallback>) {
        let mut streams = self.streams.lock();
        let interest = streams.entry(stream).or_default();
        match callback {
            Some(cb) => {
                if !interest.callbacks.iter().any(|c| same_callback(c, &cb)) {
                    interest.callbacks.push(cb);
                }
            }
            None => interest.observe_all = true,
        }
    }

    pub fn remove(&self, stream: &StreamName, callback: Option<&EventCallback>) {
        let mut streams = self.streams.lock();
        let Some(interest) = streams.get_mut(stream) else {
            return;
        };
        match callback {
            Some(cb) => interest.callbacks.retain(|c| !same_callback(c, cb)),
            None => interest.observe_all = false,
        }
        if interest.is_empty() {
            streams.remove(stream);
        }
    }

    /// Number of callbacks registered for `stream`.
    #[must_use]
    pub fn callback_count(&self, stream: &StreamName) -> usize {
        self.streams
            .lock()
            .get(stream)
            .map_or(0, |interest| interest.callbacks.len())
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Deliver to the stream's callbacks, then to broadcast receivers.
    ///
    /// A panicking callback is logged and skipped.
    pub fn raise(&self, event: StreamEvent) {
        let callbacks = self
            .streams
            .lock()
            .get(&event.stream)
            .map(|interest| interest.callbacks.clone())
            .unwrap_or_default();
        for callback in &callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                warn!(
                    stream = %event.stream,
                    panic = %panic_message(payload.as_ref()),
                    "Event callback panicked"
                );
            }
        }
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}
