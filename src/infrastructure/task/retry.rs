//! Retrying task controller.
//!
//! Runs an action in a loop: whenever a run ends (successfully, with an error,
//! or by panicking) the loop waits the configured delay and runs it again.
//! Only cancellation ends the loop. There is no attempt limit.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{report, run_guarded, TaskAction, TaskController, TaskEvent};
use crate::error::{Error, Result};
use crate::infrastructure::config::RetryConfig;

/// What the retry loop is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Stopped,
    Running,
    Delaying,
}

/// Delay schedule between runs.
///
/// With a multiplier of 1.0 every delay equals the initial delay exactly.
/// Larger multipliers grow the delay up to the cap and add up to 20% jitter.
struct Backoff {
    config: RetryConfig,
    current_delay_ms: u64,
}

impl Backoff {
    fn new(config: RetryConfig) -> Self {
        let current_delay_ms = config.delay_ms;
        Self {
            config,
            current_delay_ms,
        }
    }

    fn reset(&mut self) {
        self.current_delay_ms = self.config.delay_ms;
    }

    fn next_delay(&mut self) -> Duration {
        if !self.config.uses_backoff() {
            return self.config.delay();
        }

        let base_ms = self.current_delay_ms;
        let jitter_range_ms = base_ms / 5;
        let jitter_ms = if jitter_range_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_range_ms)
        };

        let next = (self.current_delay_ms as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay_ms = next.min(self.config.max_delay_ms);

        Duration::from_millis(base_ms + jitter_ms)
    }

    /// A run that stayed up longer than the longest delay counts as healthy.
    fn healthy_run(&self, ran_for: Duration) -> bool {
        ran_for >= Duration::from_millis(self.config.max_delay_ms)
    }
}

/// Sets the shared state back to `Stopped` when the loop exits, panics included.
struct StoppedOnDrop(Arc<Mutex<RetryState>>);

impl Drop for StoppedOnDrop {
    fn drop(&mut self) {
        *self.0.lock() = RetryState::Stopped;
    }
}

/// Keeps an action running, restarting it after every exit.
///
/// Faults are published on [`subscribe`](Self::subscribe) together with
/// [`TaskEvent::Pausing`] and [`TaskEvent::Resuming`] around each delay.
pub struct RetryTaskController {
    config: RetryConfig,
    task: TaskController,
    action: Mutex<Option<TaskAction>>,
    state: Arc<Mutex<RetryState>>,
    // Serializes begin/restart/cancel so a restart cannot revive a cancelled loop.
    lifecycle: tokio::sync::Mutex<()>,
}

impl RetryTaskController {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            task: TaskController::new(),
            action: Mutex::new(None),
            state: Arc::new(Mutex::new(RetryState::Stopped)),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Receive fault and pause/resume notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.task.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> RetryState {
        *self.state.lock()
    }

    /// True while the retry loop is alive, including while delaying.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.is_active()
    }

    /// Start the retry loop around `action`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the loop is already running.
    pub async fn begin(&self, action: TaskAction) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_loop(action)
    }

    /// Cancel the current run or delay and start the stored action again
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the loop was never started or has
    /// been cancelled.
    pub async fn restart(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let action = self
            .action
            .lock()
            .clone()
            .ok_or_else(|| Error::InvalidState("retry task is not running".into()))?;

        info!("Restarting task");
        self.task.cancel().await;
        self.start_loop(action)
    }

    /// Stop the loop and wait until the action has exited.
    ///
    /// No further runs happen once this returns.
    pub async fn cancel(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.action.lock().take();
        self.task.cancel().await;
    }

    fn start_loop(&self, action: TaskAction) -> Result<()> {
        if self.task.is_active() {
            return Err(Error::InvalidState("retry task is already running".into()));
        }
        *self.action.lock() = Some(Arc::clone(&action));

        let events = self.task.events();
        let state = Arc::clone(&self.state);
        let backoff = Backoff::new(self.config.clone());
        self.task
            .begin(move |token| retry_loop(action, token, events, state, backoff))
    }
}

async fn retry_loop(
    action: TaskAction,
    token: CancellationToken,
    events: broadcast::Sender<TaskEvent>,
    state: Arc<Mutex<RetryState>>,
    mut backoff: Backoff,
) -> Result<()> {
    let _stopped = StoppedOnDrop(Arc::clone(&state));
    let mut first_run = true;

    loop {
        if !first_run {
            debug!("Resuming task");
            let _ = events.send(TaskEvent::Resuming);
        }
        first_run = false;

        *state.lock() = RetryState::Running;
        let started = Instant::now();
        let outcome = run_guarded(action(token.clone())).await;

        if token.is_cancelled() {
            break;
        }

        match outcome {
            Ok(()) => {
                debug!("Task run completed");
                backoff.reset();
            }
            Err(e) if e.is_cancelled() => debug!("Task run cancelled itself"),
            Err(e) => {
                if backoff.healthy_run(started.elapsed()) {
                    backoff.reset();
                }
                report(&events, e);
            }
        }

        let delay = backoff.next_delay();
        *state.lock() = RetryState::Delaying;
        info!(delay_ms = delay.as_millis() as u64, "Pausing before next run");
        let _ = events.send(TaskEvent::Pausing { delay });

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Retry loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::infrastructure::task::task_action;

    fn fixed(delay_ms: u64) -> RetryConfig {
        RetryConfig {
            delay_ms,
            max_delay_ms: delay_ms,
            backoff_multiplier: 1.0,
        }
    }

    fn counting_failure(runs: &Arc<AtomicU32>) -> TaskAction {
        let runs = Arc::clone(runs);
        task_action(move |_| {
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Err(Error::Connection("refused".into()))
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn failing_action_is_retried_after_fixed_delay() {
        let controller = RetryTaskController::new(fixed(5_000));
        let starts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&starts);

        controller
            .begin(task_action(move |_| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(Instant::now());
                    Err(Error::Connection("refused".into()))
                }
            }))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(12_000)).await;
        controller.cancel().await;

        let starts = starts.lock().clone();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(5_000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn faults_and_pauses_are_published_in_order() {
        let controller = RetryTaskController::new(fixed(1_000));
        let mut events = controller.subscribe();
        let runs = Arc::new(AtomicU32::new(0));

        controller.begin(counting_failure(&runs)).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), TaskEvent::Error(_)));
        match events.recv().await.unwrap() {
            TaskEvent::Pausing { delay } => assert_eq!(delay, Duration::from_millis(1_000)),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(events.recv().await.unwrap(), TaskEvent::Resuming));
        assert!(matches!(events.recv().await.unwrap(), TaskEvent::Error(_)));

        controller.cancel().await;
    }

    #[tokio::test(start_paused = true)]
    async fn successful_runs_are_restarted_too() {
        let controller = RetryTaskController::new(fixed(100));
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);

        controller
            .begin(task_action(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        controller.cancel().await;

        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_delay_prevents_further_runs() {
        let controller = RetryTaskController::new(fixed(5_000));
        let runs = Arc::new(AtomicU32::new(0));

        controller.begin(counting_failure(&runs)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.state(), RetryState::Delaying);

        controller.cancel().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), RetryState::Stopped);
        assert!(!controller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_skips_the_delay() {
        let controller = RetryTaskController::new(fixed(3_600_000));
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);

        controller
            .begin(task_action(move |token: CancellationToken| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    token.cancelled().await;
                    Err(Error::Cancelled)
                }
            }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        controller.restart().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(controller.state(), RetryState::Running);
        controller.cancel().await;
    }

    #[tokio::test]
    async fn restart_after_cancel_is_rejected() {
        let controller = RetryTaskController::new(fixed(1_000));
        let runs = Arc::new(AtomicU32::new(0));

        controller.begin(counting_failure(&runs)).await.unwrap();
        controller.cancel().await;

        assert!(matches!(controller.restart().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn begin_twice_is_rejected() {
        let controller = RetryTaskController::new(fixed(1_000));
        let runs = Arc::new(AtomicU32::new(0));

        controller.begin(counting_failure(&runs)).await.unwrap();
        let second = controller.begin(counting_failure(&runs)).await;
        assert!(matches!(second, Err(Error::InvalidState(_))));

        controller.cancel().await;
    }

    #[test]
    fn backoff_grows_to_cap_and_resets() {
        let mut backoff = Backoff::new(RetryConfig {
            delay_ms: 1_000,
            max_delay_ms: 4_000,
            backoff_multiplier: 2.0,
        });

        let within = |d: Duration, base: u64| {
            d >= Duration::from_millis(base) && d <= Duration::from_millis(base + base / 5)
        };
        assert!(within(backoff.next_delay(), 1_000));
        assert!(within(backoff.next_delay(), 2_000));
        assert!(within(backoff.next_delay(), 4_000));
        assert!(within(backoff.next_delay(), 4_000));

        backoff.reset();
        assert!(within(backoff.next_delay(), 1_000));
    }

    #[test]
    fn fixed_delay_has_no_jitter() {
        let mut backoff = Backoff::new(fixed(5_000));
        for _ in 0..3 {
            assert_eq!(backoff.next_delay(), Duration::from_millis(5_000));
        }
    }
}
