//! Single-run cancellable task controller.

use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{report, run_guarded, TaskEvent, EVENT_CHANNEL_CAPACITY};
use crate::error::{Error, Result};

struct ActiveTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveTask {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Runs one cancellable action to completion on a background task.
///
/// Faults that escape the action are published on [`subscribe`](Self::subscribe)
/// rather than returned to the caller of [`begin`](Self::begin). Dropping the
/// controller cancels an active action without waiting for it; call
/// [`cancel`](Self::cancel) to cancel and wait.
pub struct TaskController {
    active: Mutex<Option<ActiveTask>>,
    events: broadcast::Sender<TaskEvent>,
}

impl TaskController {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self::with_events(events)
    }

    /// Create a controller publishing on an existing event channel.
    #[must_use]
    pub fn with_events(events: broadcast::Sender<TaskEvent>) -> Self {
        Self {
            active: Mutex::new(None),
            events,
        }
    }

    /// Receive fault notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    pub(crate) fn events(&self) -> broadcast::Sender<TaskEvent> {
        self.events.clone()
    }

    /// True while an action is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.lock().as_ref().is_some_and(ActiveTask::is_running)
    }

    /// Start `action` with a fresh cancellation token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if an action is already running.
    pub fn begin<F, Fut>(&self, action: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(ActiveTask::is_running) {
            return Err(Error::InvalidState("task is already active".into()));
        }

        let token = CancellationToken::new();
        let run_token = token.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let outcome = run_guarded(action(run_token.clone())).await;
            match outcome {
                Ok(()) => debug!("Task completed"),
                Err(e) if e.is_cancelled() || run_token.is_cancelled() => {
                    debug!(error = %e, "Task stopped by cancellation");
                }
                Err(e) => report(&events, e),
            }
        });

        *active = Some(ActiveTask { token, handle });
        Ok(())
    }

    /// Request cancellation and wait until the action has exited.
    ///
    /// A no-op when nothing is running.
    pub async fn cancel(&self) {
        let task = self.active.lock().take();
        let Some(task) = task else {
            return;
        };
        task.token.cancel();
        if let Err(e) = task.handle.await {
            error!(error = %e, "Task join failed");
        }
    }
}

impl Default for TaskController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskController {
    fn drop(&mut self) {
        if let Some(task) = self.active.get_mut().take() {
            task.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::broadcast::error::TryRecvError;

    #[tokio::test]
    async fn begin_runs_action() {
        let controller = TaskController::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        controller
            .begin(move |_| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(ran.load(Ordering::SeqCst));
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn begin_while_active_is_rejected() {
        let controller = TaskController::new();
        controller
            .begin(|token: CancellationToken| async move {
                token.cancelled().await;
                Ok(())
            })
            .unwrap();

        let second = controller.begin(|_| async { Ok(()) });
        assert!(matches!(second, Err(Error::InvalidState(_))));

        controller.cancel().await;
    }

    #[tokio::test]
    async fn begin_after_completion_is_allowed() {
        let controller = TaskController::new();
        let runs = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let counter = Arc::clone(&runs);
            controller
                .begin(move |_| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_waits_for_action_exit() {
        let controller = TaskController::new();
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);

        controller
            .begin(move |token: CancellationToken| async move {
                token.cancelled().await;
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        controller.cancel().await;
        assert!(exited.load(Ordering::SeqCst));
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn faults_are_published_not_returned() {
        let controller = TaskController::new();
        let mut events = controller.subscribe();

        controller
            .begin(|_| async { Err(Error::Connection("reset by peer".into())) })
            .unwrap();

        let event = events.recv().await.unwrap();
        match event {
            TaskEvent::Error(e) => assert!(matches!(*e, Error::Connection(_))),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn panics_are_reported_as_faults() {
        let controller = TaskController::new();
        let mut events = controller.subscribe();

        controller
            .begin(|_| async {
                panic!("boom");
                #[allow(unreachable_code)]
                Ok(())
            })
            .unwrap();

        match events.recv().await.unwrap() {
            TaskEvent::Error(e) => assert!(matches!(&*e, Error::TaskPanicked(msg) if msg == "boom")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_errors_are_swallowed() {
        let controller = TaskController::new();
        let mut events = controller.subscribe();

        controller
            .begin(|token: CancellationToken| async move {
                token.cancelled().await;
                Err(Error::Cancelled)
            })
            .unwrap();
        controller.cancel().await;

        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }
}
