//! Stream-name multiplexer.
//!
//! Owns the set of wanted stream names and their observers, and runs the
//! session loop that keeps one transport session open for exactly that set.
//! Changing the set aborts the current session after a short debounce so the
//! loop reopens with the new set; a burst of changes coalesces into one
//! reconnect.
//!
//! - [`registry`] - Stream name to observer map with set semantics
//! - [`buffer`] - Ordered single-consumer queue between receive and dispatch
//! - [`frame`] - Session URIs and combined-stream envelope parsing

pub mod buffer;
pub mod frame;
pub mod registry;


use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

pub use buffer::QueuedMessageBuffer;
pub use registry::ObserverRegistry;

use crate::domain::id::StreamName;
use crate::error::{Error, Result};
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::task::panic_message;
use crate::port::{Frame, StreamObserver, Transport, TransportSession};

/// Observer handle registered with the multiplexer.
pub type ObserverRef = Arc<dyn StreamObserver>;

/// One routed message, mirrored to raw listeners after observer dispatch.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub stream: StreamName,
    pub data: Arc<Value>,
}

/// Point-in-time multiplexer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiplexerStats {
    pub sessions_opened: u64,
    /// Session aborts requested by subscription changes, pauses and
    /// explicit reconnects.
    pub reconnects_requested: u64,
    pub messages_received: u64,
    /// Frames that could not be parsed or carried no stream name.
    pub messages_dropped: u64,
}

#[derive(Default)]
struct Counters {
    sessions_opened: AtomicU64,
    reconnects_requested: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
}

/// The set one open session was started with.
struct Session {
    id: u64,
    streams: BTreeSet<StreamName>,
    token: CancellationToken,
}

struct State {
    registry: ObserverRegistry<dyn StreamObserver>,
    session: Option<Session>,
    paused: bool,
    next_session_id: u64,
}

impl State {
    /// Abort the open session if it no longer matches the wanted set.
    fn abort_if_stale(&mut self) -> bool {
        let wanted = self.registry.names();
        match &self.session {
            Some(session) if self.paused || session.streams != wanted => {
                session.token.cancel();
                true
            }
            _ => false,
        }
    }
}

struct Shared {
    state: Mutex<State>,
    /// Wakes an idle session loop after the set or pause flag changed.
    changed: Notify,
    streaming: AtomicBool,
    abort_scheduled: AtomicBool,
    raw: broadcast::Sender<RawMessage>,
    counters: Counters,
}

impl Shared {
    fn apply_pending_change(&self) {
        let aborted = self.state.lock().abort_if_stale();
        if aborted {
            self.counters.reconnects_requested.fetch_add(1, Ordering::Relaxed);
            info!("Stream set changed, reconnecting");
        }
        self.changed.notify_one();
    }

    /// Route one frame to the observers of its stream, then to raw listeners.
    fn dispatch(&self, single: Option<&StreamName>, text: &str) -> Result<()> {
        let parsed = serde_json::from_str::<Value>(text)
            .map_err(Error::from)
            .and_then(|value| frame::split_frame(value, single));
        let (stream, data) = match parsed {
            Ok(pair) => pair,
            Err(e) => {
                self.counters.messages_dropped.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let observers = self.state.lock().registry.observers(&stream);
        for observer in observers {
            match panic::catch_unwind(AssertUnwindSafe(|| observer.on_message(&stream, &data))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(stream = %stream, error = %e, "Observer failed"),
                Err(payload) => warn!(
                    stream = %stream,
                    panic = %panic_message(payload.as_ref()),
                    "Observer panicked"
                ),
            }
        }

        // No raw listeners is fine.
        let _ = self.raw.send(RawMessage {
            stream,
            data: Arc::new(data),
        });
        Ok(())
    }
}

/// Clears the streaming flag when the session loop exits.
struct StreamingGuard<'a>(&'a AtomicBool);

impl Drop for StreamingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Routes messages from one shared transport session to per-stream observers.
///
/// [`stream`](Self::stream) is the long-running action; run it under a
/// [`RetryTaskController`](crate::infrastructure::task::RetryTaskController)
/// so transport faults are retried.
pub struct StreamMultiplexer {
    transport: Arc<dyn Transport>,
    base_url: Url,
    config: StreamConfig,
    shared: Arc<Shared>,
}

impl StreamMultiplexer {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, base_url: Url, config: StreamConfig) -> Self {
        let (raw, _) = broadcast::channel(config.raw_channel_capacity.max(1));
        Self {
            transport,
            base_url,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    registry: ObserverRegistry::new(),
                    session: None,
                    paused: false,
                    next_session_id: 0,
                }),
                changed: Notify::new(),
                streaming: AtomicBool::new(false),
                abort_scheduled: AtomicBool::new(false),
                raw,
                counters: Counters::default(),
            }),
        }
    }

    /// Register `observer` for each name.
    ///
    /// Newly wanted names schedule a debounced reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `names` is empty.
    pub fn subscribe(&self, observer: &ObserverRef, names: &[StreamName]) -> Result<()> {
        if names.is_empty() {
            return Err(Error::InvalidArgument("no stream names to subscribe".into()));
        }
        let added = self.shared.state.lock().registry.add(observer, names);
        if !added.is_empty() {
            debug!(streams = ?added, "Streams added");
            self.schedule_abort();
        }
        Ok(())
    }

    /// Unregister `observer` from each name.
    ///
    /// Names left without observers are dropped from the set, scheduling a
    /// debounced reconnect. Names the observer was never registered under are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `names` is empty, and
    /// [`Error::InvalidOperation`] for a name outside the set when strict
    /// unsubscribing is enabled.
    pub fn unsubscribe(&self, observer: &ObserverRef, names: &[StreamName]) -> Result<()> {
        if names.is_empty() {
            return Err(Error::InvalidArgument("no stream names to unsubscribe".into()));
        }
        let removed = {
            let mut state = self.shared.state.lock();
            self.check_known(&state, names)?;
            state.registry.remove(observer, names)
        };
        self.after_removal(&removed);
        Ok(())
    }

    /// Unregister `observer` from every name.
    pub fn unsubscribe_all(&self, observer: &ObserverRef) {
        let removed = self.shared.state.lock().registry.remove_everywhere(observer);
        self.after_removal(&removed);
    }

    /// Keep each name in the set without an observer. Its messages still
    /// reach raw listeners.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `names` is empty.
    pub fn subscribe_streams(&self, names: &[StreamName]) -> Result<()> {
        if names.is_empty() {
            return Err(Error::InvalidArgument("no stream names to subscribe".into()));
        }
        let added = self.shared.state.lock().registry.pin(names);
        if !added.is_empty() {
            debug!(streams = ?added, "Streams added");
            self.schedule_abort();
        }
        Ok(())
    }

    /// Drop registrations made with [`subscribe_streams`](Self::subscribe_streams).
    ///
    /// # Errors
    ///
    /// Same as [`unsubscribe`](Self::unsubscribe).
    pub fn unsubscribe_streams(&self, names: &[StreamName]) -> Result<()> {
        if names.is_empty() {
            return Err(Error::InvalidArgument("no stream names to unsubscribe".into()));
        }
        let removed = {
            let mut state = self.shared.state.lock();
            self.check_known(&state, names)?;
            state.registry.unpin(names)
        };
        self.after_removal(&removed);
        Ok(())
    }

    /// Stop opening sessions and close the current one. The stream set is
    /// kept.
    pub fn pause(&self) {
        let aborted = {
            let mut state = self.shared.state.lock();
            if state.paused {
                return;
            }
            state.paused = true;
            state.abort_if_stale()
        };
        if aborted {
            self.shared
                .counters
                .reconnects_requested
                .fetch_add(1, Ordering::Relaxed);
        }
        info!("Streaming paused");
    }

    /// Allow sessions again after [`pause`](Self::pause).
    pub fn resume(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.paused {
                return;
            }
            state.paused = false;
        }
        info!("Streaming resumed");
        self.shared.changed.notify_one();
    }

    /// Abort the current session now so the loop reopens it.
    pub fn reconnect(&self) {
        let aborted = match &self.shared.state.lock().session {
            Some(session) => {
                session.token.cancel();
                true
            }
            None => false,
        };
        if aborted {
            self.shared
                .counters
                .reconnects_requested
                .fetch_add(1, Ordering::Relaxed);
            info!("Reconnect requested");
        }
    }

    /// Run sessions for the current stream set until `token` is cancelled.
    ///
    /// Idles without a connection while the set is empty or streaming is
    /// paused. A session aborted by a set change, pause or reconnect is
    /// reopened immediately; a session closed by the server ends the call
    /// with [`Error::Connection`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if already running or if no
    /// streams are subscribed, and any transport error of the session.
    pub async fn stream(&self, token: CancellationToken) -> Result<()> {
        if self.shared.state.lock().registry.is_empty() {
            return Err(Error::InvalidOperation("no streams subscribed".into()));
        }
        if self.shared.streaming.swap(true, Ordering::AcqRel) {
            return Err(Error::InvalidOperation("already streaming".into()));
        }
        let _streaming = StreamingGuard(&self.shared.streaming);

        loop {
            if token.is_cancelled() {
                return Ok(());
            }

            // Register interest before checking, so a change in between
            // still wakes us.
            let changed = self.shared.changed.notified();
            let next = {
                let mut state = self.shared.state.lock();
                if state.paused || state.registry.is_empty() {
                    None
                } else {
                    state.next_session_id += 1;
                    let session = Session {
                        id: state.next_session_id,
                        streams: state.registry.names(),
                        token: token.child_token(),
                    };
                    let opened = (session.id, session.streams.clone(), session.token.clone());
                    state.session = Some(session);
                    Some(opened)
                }
            };

            let Some((id, streams, session_token)) = next else {
                debug!("No streams to open, idling");
                tokio::select! {
                    () = token.cancelled() => return Ok(()),
                    () = changed => continue,
                }
            };

            let result = self.run_session(&streams, &session_token).await;
            {
                let mut state = self.shared.state.lock();
                if state.session.as_ref().is_some_and(|s| s.id == id) {
                    state.session = None;
                }
            }
            result?;
        }
    }

    async fn run_session(
        &self,
        streams: &BTreeSet<StreamName>,
        session_token: &CancellationToken,
    ) -> Result<()> {
        let uri = frame::session_uri(&self.base_url, streams)?;
        info!(uri = %uri, streams = streams.len(), "Opening stream session");

        let mut session = tokio::select! {
            biased;
            () = session_token.cancelled() => return Ok(()),
            connected = self.transport.connect(&uri) => connected?,
        };
        self.shared
            .counters
            .sessions_opened
            .fetch_add(1, Ordering::Relaxed);

        let single = (streams.len() == 1)
            .then(|| streams.iter().next().cloned())
            .flatten();
        let shared = Arc::clone(&self.shared);
        let buffer =
            QueuedMessageBuffer::new(move |text: String| shared.dispatch(single.as_ref(), &text));

        let outcome = self.pump(session.as_mut(), &buffer, session_token).await;

        buffer.complete().await;
        if let Err(e) = session.close().await {
            debug!(error = %e, "Session close failed");
        }
        match &outcome {
            Ok(()) => debug!("Stream session aborted"),
            Err(e) => warn!(error = %e, "Stream session ended"),
        }
        outcome
    }

    async fn pump(
        &self,
        session: &mut dyn TransportSession,
        buffer: &QueuedMessageBuffer<String>,
        session_token: &CancellationToken,
    ) -> Result<()> {
        loop {
            let frame = tokio::select! {
                biased;
                () = session_token.cancelled() => return Ok(()),
                frame = session.receive() => frame?,
            };
            match frame {
                Frame::Text(text) => {
                    self.shared
                        .counters
                        .messages_received
                        .fetch_add(1, Ordering::Relaxed);
                    trace!(len = text.len(), "Frame received");
                    buffer.post(text)?;
                }
                Frame::Closed(reason) => {
                    return Err(Error::Connection(format!(
                        "session closed by server: {}",
                        reason.as_deref().unwrap_or("no reason")
                    )));
                }
            }
        }
    }

    /// Stream names currently wanted.
    #[must_use]
    pub fn active_streams(&self) -> BTreeSet<StreamName> {
        self.shared.state.lock().registry.names()
    }

    /// Stream names of the open session, if any.
    #[must_use]
    pub fn session_streams(&self) -> Option<BTreeSet<StreamName>> {
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| s.streams.clone())
    }

    #[must_use]
    pub fn is_registered(&self, observer: &ObserverRef, name: &StreamName) -> bool {
        self.shared.state.lock().registry.is_registered(observer, name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().registry.is_empty()
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Every routed message, for diagnostics.
    #[must_use]
    pub fn subscribe_raw(&self) -> broadcast::Receiver<RawMessage> {
        self.shared.raw.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> MultiplexerStats {
        let c = &self.shared.counters;
        MultiplexerStats {
            sessions_opened: c.sessions_opened.load(Ordering::Relaxed),
            reconnects_requested: c.reconnects_requested.load(Ordering::Relaxed),
            messages_received: c.messages_received.load(Ordering::Relaxed),
            messages_dropped: c.messages_dropped.load(Ordering::Relaxed),
        }
    }

    fn check_known(&self, state: &State, names: &[StreamName]) -> Result<()> {
        if !self.config.strict_unsubscribe {
            return Ok(());
        }
        match names.iter().find(|n| !state.registry.contains(n)) {
            Some(unknown) => Err(Error::InvalidOperation(format!(
                "not subscribed to stream {unknown}"
            ))),
            None => Ok(()),
        }
    }

    fn after_removal(&self, removed: &[StreamName]) {
        if !removed.is_empty() {
            debug!(streams = ?removed, "Streams removed");
            self.schedule_abort();
        }
    }

    /// Compare the wanted set with the open session once the debounce
    /// window has passed. Calls made within the window share one check.
    fn schedule_abort(&self) {
        if self.shared.abort_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let debounce = self.config.debounce();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(debounce).await;
                    shared.abort_scheduled.store(false, Ordering::Release);
                    shared.apply_pending_change();
                });
            }
            // No runtime means no session loop either.
            Err(_) => {
                shared.abort_scheduled.store(false, Ordering::Release);
                shared.apply_pending_change();
            }
        }
    }
}
