//! Typed client coordination.
//!
//! [`ClientManager`] keeps a [`StreamClient`]'s observed stream names and the
//! shared [`StreamMultiplexer`] in lockstep, starts the retry loop that runs
//! the multiplexer, and restarts it when the client's feed goes silent.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::domain::StreamName;
use crate::error::{Error, Result};
use crate::infrastructure::config::WatchdogConfig;
use crate::infrastructure::stream::{ObserverRef, StreamMultiplexer};
use crate::infrastructure::task::{task_action, RetryTaskController, TaskEvent};
use crate::infrastructure::watchdog::WatchdogTimer;
use crate::port::{EventCallback, StreamClient, StreamObserver};

/// Forwards routed messages to the client and marks the feed as alive.
struct ClientObserver<C> {
    client: Arc<C>,
    watchdog: Arc<WatchdogTimer>,
}

impl<C: StreamClient> StreamObserver for ClientObserver<C> {
    fn on_message(&self, stream: &StreamName, data: &Value) -> Result<()> {
        self.watchdog.kick();
        self.client.handle_message(stream, data)
    }
}

/// Binds one typed client to a shared multiplexer and retry controller.
///
/// Several managers may share one multiplexer and controller; whichever
/// subscribes first starts the controller.
pub struct ClientManager<C: StreamClient> {
    client: Arc<C>,
    multiplexer: Arc<StreamMultiplexer>,
    controller: Arc<RetryTaskController>,
    watchdog: Arc<WatchdogTimer>,
    observer: ObserverRef,
    lock: Mutex<()>,
}

impl<C: StreamClient> ClientManager<C> {
    pub fn new(
        client: Arc<C>,
        multiplexer: Arc<StreamMultiplexer>,
        controller: Arc<RetryTaskController>,
        watchdog: &WatchdogConfig,
    ) -> Self {
        let watchdog = Arc::new(WatchdogTimer::new(watchdog));
        let observer: ObserverRef = Arc::new(ClientObserver {
            client: Arc::clone(&client),
            watchdog: Arc::clone(&watchdog),
        });
        Self {
            client,
            multiplexer,
            controller,
            watchdog,
            observer,
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    #[must_use]
    pub fn multiplexer(&self) -> &Arc<StreamMultiplexer> {
        &self.multiplexer
    }

    #[must_use]
    pub fn controller(&self) -> &Arc<RetryTaskController> {
        &self.controller
    }

    /// True while the silence watchdog is armed.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watchdog.is_running()
    }

    /// Non-fatal faults and pause/resume notifications of the shared
    /// controller.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<TaskEvent> {
        self.controller.subscribe()
    }

    /// Subscribe the client to `topic` and push any stream names it newly
    /// needs to the multiplexer.
    ///
    /// # Errors
    ///
    /// Returns the client's own subscribe error; the multiplexer is left
    /// untouched in that case.
    pub async fn subscribe(&self, topic: &C::Topic, callback: Option<EventCallback>) -> Result<()> {
        let _serial = self.lock.lock().await;

        let before = self.client.observed_streams();
        self.client.subscribe(topic, callback)?;
        let added = difference(&self.client.observed_streams(), &before);

        if !added.is_empty() {
            debug!(streams = ?added, "Client observes new streams");
            self.multiplexer.subscribe(&self.observer, &added)?;
        }
        self.ensure_running().await
    }

    /// Unsubscribe the client from `topic` and release stream names it no
    /// longer needs.
    ///
    /// # Errors
    ///
    /// Returns the client's own unsubscribe error, or the multiplexer's when
    /// strict unsubscribing rejects a name. In the latter case the client's
    /// registration is restored.
    pub async fn unsubscribe(
        &self,
        topic: &C::Topic,
        callback: Option<&EventCallback>,
    ) -> Result<()> {
        let _serial = self.lock.lock().await;

        let before = self.client.observed_streams();
        self.client.unsubscribe(topic, callback)?;
        let after = self.client.observed_streams();
        let removed = difference(&before, &after);

        if !removed.is_empty() {
            debug!(streams = ?removed, "Client released streams");
            if let Err(e) = self.multiplexer.unsubscribe(&self.observer, &removed) {
                if let Err(restore) = self.client.subscribe(topic, callback.cloned()) {
                    warn!(error = %restore, "Failed to restore client subscription");
                }
                return Err(e);
            }
        }
        if after.is_empty() {
            self.watchdog.stop();
        }
        Ok(())
    }

    /// Ordered teardown: stop the shared controller and wait for the session
    /// to drain, stop the watchdog, then release this client's streams.
    ///
    /// Stops every manager sharing the controller.
    pub async fn shutdown(&self) {
        let _serial = self.lock.lock().await;
        self.controller.cancel().await;
        self.watchdog.stop();
        self.multiplexer.unsubscribe_all(&self.observer);
        info!("Client manager shut down");
    }

    async fn ensure_running(&self) -> Result<()> {
        if self.client.observed_streams().is_empty() {
            return Ok(());
        }

        if !self.controller.is_active() {
            let multiplexer = Arc::clone(&self.multiplexer);
            let action = task_action(move |token| {
                let multiplexer = Arc::clone(&multiplexer);
                async move { multiplexer.stream(token).await }
            });
            match self.controller.begin(action).await {
                Ok(()) => info!("Stream controller started"),
                // Another manager on the same controller won the race.
                Err(Error::InvalidState(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let controller: Weak<RetryTaskController> = Arc::downgrade(&self.controller);
        self.watchdog.start(move || {
            let Some(controller) = controller.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                info!("Feed silent, restarting stream controller");
                if let Err(e) = controller.restart().await {
                    warn!(error = %e, "Watchdog restart failed");
                }
            });
        });
        Ok(())
    }
}

fn difference(left: &BTreeSet<StreamName>, right: &BTreeSet<StreamName>) -> Vec<StreamName> {
    left.difference(right).cloned().collect()
}
