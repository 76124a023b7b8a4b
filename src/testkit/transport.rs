//! Mock [`Transport`] driven through a control handle.
//!
//! [`ChannelTransport`] hands out sessions backed by an unbounded channel.
//! The paired [`ChannelTransportHandle`] records every connect URI and feeds
//! frames, closes and faults into the most recent session. No network I/O.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use url::Url;

use crate::error::{Error, Result};
use crate::port::{Frame, Transport, TransportSession};

type FrameSender = mpsc::UnboundedSender<Result<Frame>>;

#[derive(Default)]
struct Shared {
    uris: Mutex<Vec<Url>>,
    current: Mutex<Option<FrameSender>>,
    connect_failures: Mutex<VecDeque<Error>>,
    closed: AtomicU32,
    connected: Notify,
}

/// A transport whose sessions are fed by a [`ChannelTransportHandle`].
pub struct ChannelTransport {
    shared: Arc<Shared>,
}

/// Control handle for a [`ChannelTransport`].
#[derive(Clone)]
pub struct ChannelTransportHandle {
    shared: Arc<Shared>,
}

/// Create a [`ChannelTransport`] and its control [`ChannelTransportHandle`].
pub fn channel_transport() -> (ChannelTransport, ChannelTransportHandle) {
    let shared = Arc::new(Shared::default());
    (
        ChannelTransport {
            shared: Arc::clone(&shared),
        },
        ChannelTransportHandle { shared },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self, uri: &Url) -> Result<Box<dyn TransportSession>> {
        self.shared.uris.lock().push(uri.clone());
        let failure = self.shared.connect_failures.lock().pop_front();
        if let Some(error) = failure {
            self.shared.connected.notify_waiters();
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.current.lock() = Some(tx);
        self.shared.connected.notify_waiters();
        Ok(Box::new(ChannelSession {
            rx,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ChannelSession {
    rx: mpsc::UnboundedReceiver<Result<Frame>>,
    shared: Arc<Shared>,
}

#[async_trait]
impl TransportSession for ChannelSession {
    async fn receive(&mut self) -> Result<Frame> {
        match self.rx.recv().await {
            Some(item) => item,
            None => Ok(Frame::Closed(None)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ChannelTransportHandle {
    fn push(&self, item: Result<Frame>) -> bool {
        match self.shared.current.lock().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    /// Deliver a text frame to the current session. False if none is open.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.push(Ok(Frame::Text(text.into())))
    }

    /// Deliver a JSON value as a text frame.
    pub fn send_json(&self, value: &Value) -> bool {
        self.send_text(value.to_string())
    }

    /// End the current session as if the server closed it.
    pub fn close_session(&self, reason: Option<&str>) -> bool {
        self.push(Ok(Frame::Closed(reason.map(str::to_string))))
    }

    /// Make the current session's next receive fail.
    pub fn fail_session(&self, error: Error) -> bool {
        self.push(Err(error))
    }

    /// Make the next `connect` call fail.
    pub fn fail_next_connect(&self, error: Error) {
        self.shared.connect_failures.lock().push_back(error);
    }

    /// How many times `connect()` was called.
    pub fn connect_count(&self) -> usize {
        self.shared.uris.lock().len()
    }

    /// Every URI passed to `connect()`, oldest first.
    pub fn uris(&self) -> Vec<Url> {
        self.shared.uris.lock().clone()
    }

    pub fn last_uri(&self) -> Option<Url> {
        self.shared.uris.lock().last().cloned()
    }

    /// How many sessions the engine closed.
    pub fn closed_count(&self) -> u32 {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Wait until `connect()` has been called at least `n` times.
    pub async fn wait_for_connects(&self, n: usize) {
        loop {
            let notified = self.shared.connected.notified();
            if self.connect_count() >= n {
                return;
            }
            notified.await;
        }
    }
}
