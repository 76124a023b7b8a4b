//! Observers and callbacks that record what they receive.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::domain::{StreamEvent, StreamName};
use crate::error::Result;
use crate::infrastructure::stream::ObserverRef;
use crate::port::{EventCallback, StreamObserver};

/// A [`StreamObserver`] that stores every message.
#[derive(Default)]
pub struct RecordingObserver {
    messages: Mutex<Vec<(StreamName, Value)>>,
}

impl RecordingObserver {
    /// A recording observer plus the same allocation as an [`ObserverRef`].
    pub fn shared() -> (Arc<Self>, ObserverRef) {
        let observer = Arc::new(Self::default());
        let as_ref: ObserverRef = observer.clone();
        (observer, as_ref)
    }

    pub fn messages(&self) -> Vec<(StreamName, Value)> {
        self.messages.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().len()
    }

    /// Stream names of the received messages, in arrival order.
    pub fn streams(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .map(|(s, _)| s.as_str().to_string())
            .collect()
    }
}

impl StreamObserver for RecordingObserver {
    fn on_message(&self, stream: &StreamName, data: &Value) -> Result<()> {
        self.messages
            .lock()
            .push((stream.clone(), data.clone()));
        Ok(())
    }
}

/// An [`EventCallback`] that stores every event it is called with.
pub fn recording_callback() -> (EventCallback, Arc<Mutex<Vec<StreamEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: EventCallback = Arc::new(move |event: &StreamEvent| {
        sink.lock().push(event.clone());
    });
    (callback, events)
}
