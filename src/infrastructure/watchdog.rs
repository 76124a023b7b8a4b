//! Idle-time failure detector.
//!
//! A background loop polls on a short fixed tick and compares the time since
//! the last [`kick`](WatchdogTimer::kick) against the configured interval. On
//! expiry the clock is reset before the callback runs, so the callback fires
//! once per silent window no matter how long it takes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::infrastructure::config::WatchdogConfig;

/// Shared clock: milliseconds since `origin` at the last kick.
struct Clock {
    origin: Instant,
    last_kick_ms: AtomicU64,
}

impl Clock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn reset(&self) {
        self.last_kick_ms.store(self.now_ms(), Ordering::Release);
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_kick_ms.load(Ordering::Acquire);
        Duration::from_millis(self.now_ms().saturating_sub(last))
    }
}

/// Fires a callback when no activity was seen for a whole interval.
pub struct WatchdogTimer {
    interval: Duration,
    poll_interval: Duration,
    clock: Arc<Clock>,
    running: Mutex<Option<CancellationToken>>,
}

impl WatchdogTimer {
    #[must_use]
    pub fn new(config: &WatchdogConfig) -> Self {
        Self::with_intervals(config.interval(), config.poll_interval())
    }

    #[must_use]
    pub fn with_intervals(interval: Duration, poll_interval: Duration) -> Self {
        Self {
            interval,
            poll_interval,
            clock: Arc::new(Clock {
                origin: Instant::now(),
                last_kick_ms: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Record activity. Never blocks.
    pub fn kick(&self) {
        self.clock.reset();
    }

    /// Time since the last kick.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.clock.idle_for()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start polling. `on_timeout` runs on the poll task and must return
    /// quickly; spawn any real work.
    ///
    /// Starting an already running watchdog is a no-op.
    pub fn start<F>(&self, on_timeout: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }

        self.clock.reset();
        let token = CancellationToken::new();
        let stop = token.clone();
        let clock = Arc::clone(&self.clock);
        let interval = self.interval;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let idle = clock.idle_for();
                if idle >= interval {
                    clock.reset();
                    warn!(idle_ms = idle.as_millis() as u64, "Watchdog expired");
                    on_timeout();
                }
            }
            debug!("Watchdog stopped");
        });

        *running = Some(token);
        debug!(interval_ms = interval.as_millis() as u64, "Watchdog started");
    }

    /// Stop polling. A no-op when not running.
    pub fn stop(&self) {
        if let Some(token) = self.running.lock().take() {
            token.cancel();
        }
    }
}

impl Drop for WatchdogTimer {
    fn drop(&mut self) {
        if let Some(token) = self.running.get_mut().take() {
            token.cancel();
        }
    }
}
