//! Cancellable background task primitives.
//!
//! - [`TaskController`] - Runs one cancellable action, reporting faults
//! - [`RetryTaskController`] - Restarts an action forever with a delay
//!
//! Faults escaping an action (errors and panics alike) are published as
//! [`TaskEvent::Error`] on a broadcast channel instead of being returned to
//! whoever started the task.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

pub mod controller;
pub mod retry;

pub use controller::TaskController;
pub use retry::{RetryState, RetryTaskController};

/// Capacity of the task event broadcast channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notification published by task controllers.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A run ended with a fault other than cancellation.
    Error(Arc<Error>),
    /// The retry loop is about to wait `delay` before the next run.
    Pausing { delay: Duration },
    /// The retry loop is about to start the next run.
    Resuming,
}

/// A repeatable action run by a retry controller.
pub type TaskAction = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`TaskAction`].
pub fn task_action<F, Fut>(f: F) -> TaskAction
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |token| -> BoxFuture<'static, Result<()>> { Box::pin(f(token)) })
}

/// Await `fut`, converting a panic into [`Error::TaskPanicked`].
pub(crate) async fn run_guarded<Fut>(fut: Fut) -> Result<()>
where
    Fut: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Error::TaskPanicked(panic_message(payload.as_ref()))),
    }
}

/// Log a fault and publish it to event listeners.
pub(crate) fn report(events: &broadcast::Sender<TaskEvent>, error: Error) {
    warn!(error = %error, "Task faulted");
    // No receivers is fine.
    let _ = events.send(TaskEvent::Error(Arc::new(error)));
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
