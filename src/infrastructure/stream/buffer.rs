//! Single-consumer ordered message buffer.
//!
//! Decouples the transport's receive path from message processing: `post`
//! never blocks and may be called from any thread, while one consumer task
//! handles items strictly in post order, one at a time. The queue is
//! unbounded, so a slow consumer costs memory rather than dropped messages.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use crate::error::{Error, Result};
use crate::infrastructure::task::panic_message;

/// Strictly ordered FIFO with exactly one consumer invocation in flight.
pub struct QueuedMessageBuffer<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl<T: Send + 'static> QueuedMessageBuffer<T> {
    /// Create a buffer and spawn its consumer task.
    ///
    /// Handler errors and panics are logged and the consumer moves on to the
    /// next item.
    pub fn new<F>(mut handler: F) -> Self
    where
        F: FnMut(T) -> Result<()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let pending = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pending);

        let consumer = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                counter.fetch_sub(1, Ordering::AcqRel);
                match panic::catch_unwind(AssertUnwindSafe(|| handler(item))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "Buffered message handler failed"),
                    Err(payload) => error!(
                        panic = %panic_message(payload.as_ref()),
                        "Buffered message handler panicked"
                    ),
                }
            }
            trace!("Buffer consumer drained");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            consumer: Mutex::new(Some(consumer)),
            pending,
        }
    }

    /// Enqueue an item without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] once the buffer has been completed.
    pub fn post(&self, item: T) -> Result<()> {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return Err(Error::InvalidState("buffer is completed".into()));
        };
        self.pending.fetch_add(1, Ordering::AcqRel);
        tx.send(item).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            Error::InvalidState("buffer consumer has stopped".into())
        })
    }

    /// Stop accepting items and wait until every posted item was handled.
    pub async fn complete(&self) {
        drop(self.tx.lock().take());
        let consumer = self.consumer.lock().take();
        if let Some(consumer) = consumer {
            if let Err(e) = consumer.await {
                error!(error = %e, "Buffer consumer task failed");
            }
        }
    }

    /// Number of posted items not yet picked up by the consumer.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// True once [`complete`](Self::complete) has been called.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.tx.lock().is_none()
    }
}
