//! Snapshot-plus-diff order book synchronisation.
//!
//! Depth diffs are buffered until a REST snapshot is installed, replayed on
//! top of it, and then applied live as long as their update ids stay
//! contiguous. A gap discards the book and wakes the background
//! synchroniser, which fetches a fresh snapshot.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{DepthUpdate, OrderBook, StreamEvent, Symbol};
use crate::error::{Error, Result};
use crate::port::{EventCallback, SnapshotProvider};

/// Default cap on updates held while no snapshot is installed.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Notification sent after the book advanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookUpdate {
    pub symbol: Symbol,
    pub last_update_id: u64,
}

/// What happened to one depth update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No snapshot yet; kept for replay.
    Buffered,
    Applied,
    /// Already covered by the book.
    Ignored,
    /// A gap was detected; the book was discarded and a resync requested.
    OutOfSync,
}

struct State {
    book: Option<OrderBook>,
    /// True until the first update after a snapshot has been applied.
    fresh: bool,
    pending: VecDeque<DepthUpdate>,
}

/// Local order book for one symbol, kept in sync from a depth feed.
pub struct OrderBookCache {
    symbol: Symbol,
    limit: u32,
    retry_delay: Duration,
    max_pending: usize,
    state: RwLock<State>,
    tx: broadcast::Sender<BookUpdate>,
    resync: Notify,
}

impl OrderBookCache {
    /// Create a cache requesting `limit` levels per side on each snapshot.
    #[must_use]
    pub fn new(symbol: Symbol, limit: u32, retry_delay: Duration) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            symbol,
            limit,
            retry_delay,
            max_pending: DEFAULT_MAX_PENDING,
            state: RwLock::new(State {
                book: None,
                fresh: false,
                pending: VecDeque::new(),
            }),
            tx,
            resync: Notify::new(),
        }
    }

    /// Keep at most `max_pending` unsynchronised updates, dropping the
    /// oldest first.
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Subscribe to book update notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BookUpdate> {
        self.tx.subscribe()
    }

    /// True while a live book is available.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.state.read().book.is_some()
    }

    #[must_use]
    pub fn last_update_id(&self) -> Option<u64> {
        self.state.read().book.as_ref().map(OrderBook::last_update_id)
    }

    /// Number of updates waiting for a snapshot.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.read().pending.len()
    }

    /// Copy of the book truncated to the best `limit` levels per side.
    #[must_use]
    pub fn book(&self, limit: usize) -> Option<OrderBook> {
        self.state
            .read()
            .book
            .as_ref()
            .map(|b| b.clone_with_limit(limit))
    }

    /// Full copy of the book.
    #[must_use]
    pub fn snapshot(&self) -> Option<OrderBook> {
        self.state.read().book.clone()
    }

    /// Feed one depth update.
    ///
    /// Updates for other symbols are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`] if the update carries an invalid level; the
    /// book is left unchanged.
    pub fn apply(&self, update: &DepthUpdate) -> Result<SyncOutcome> {
        if update.symbol() != &self.symbol {
            return Ok(SyncOutcome::Ignored);
        }
        let outcome = {
            let mut state = self.state.write();
            if state.book.is_none() {
                self.buffer(&mut state, update);
                return Ok(SyncOutcome::Buffered);
            }
            self.apply_locked(&mut state, update)?
        };
        if outcome == SyncOutcome::OutOfSync {
            self.resync.notify_one();
        }
        Ok(outcome)
    }

    /// Fetch a snapshot, install it and replay buffered updates.
    ///
    /// Returns the book's update id afterwards. The snapshot is fetched
    /// without holding the book lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfSync`] if the buffered updates do not continue
    /// the snapshot (fetch again), or the provider's error.
    pub async fn synchronize(&self, provider: &dyn SnapshotProvider) -> Result<u64> {
        let snapshot = provider
            .order_book_snapshot(&self.symbol, self.limit)
            .await?;
        let book = OrderBook::new(
            self.symbol.clone(),
            snapshot.last_update_id,
            snapshot.bids,
            snapshot.asks,
        )?;
        debug!(
            symbol = %self.symbol,
            last_update_id = book.last_update_id(),
            "Snapshot fetched"
        );

        let mut state = self.state.write();
        let pending = std::mem::take(&mut state.pending);
        state.book = Some(book);
        state.fresh = true;
        let _ = self.tx.send(self.notification(&state));

        let mut replay = pending.into_iter();
        while let Some(update) = replay.next() {
            match self.apply_locked(&mut state, &update) {
                Ok(SyncOutcome::OutOfSync) => {
                    state.pending.extend(replay);
                    return Err(Error::OutOfSync(format!(
                        "{} snapshot is older than the buffered updates",
                        self.symbol
                    )));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "Dropping invalid buffered update");
                }
            }
        }

        state
            .book
            .as_ref()
            .map(OrderBook::last_update_id)
            .ok_or_else(|| Error::OutOfSync(format!("{} book was discarded", self.symbol)))
    }

    /// Keep the book synchronised until `token` is cancelled.
    ///
    /// Synchronises immediately when no book is live, then again after
    /// every detected gap. Failed attempts are retried after the configured
    /// delay.
    pub async fn run(&self, provider: Arc<dyn SnapshotProvider>, token: CancellationToken) {
        loop {
            let signalled = self.resync.notified();

            if !self.is_synchronized() {
                let attempt = tokio::select! {
                    () = token.cancelled() => break,
                    result = self.synchronize(provider.as_ref()) => result,
                };
                match attempt {
                    Ok(id) => info!(symbol = %self.symbol, last_update_id = id, "Order book synchronized"),
                    Err(e) => {
                        warn!(symbol = %self.symbol, error = %e, "Order book sync failed");
                        tokio::select! {
                            () = token.cancelled() => break,
                            () = tokio::time::sleep(self.retry_delay) => {}
                        }
                        continue;
                    }
                }
            }

            tokio::select! {
                () = token.cancelled() => break,
                () = signalled => {}
            }
        }
        debug!(symbol = %self.symbol, "Order book synchroniser stopped");
    }

    /// Callback feeding depth events of this symbol into the cache.
    #[must_use]
    pub fn callback(self: &Arc<Self>) -> EventCallback {
        let cache = Arc::clone(self);
        Arc::new(move |event: &StreamEvent| {
            let Some(update) = event.as_depth() else {
                return;
            };
            if let Err(e) = cache.apply(update) {
                warn!(symbol = %cache.symbol, error = %e, "Depth update rejected");
            }
        })
    }

    fn apply_locked(&self, state: &mut State, update: &DepthUpdate) -> Result<SyncOutcome> {
        let Some(book) = state.book.as_mut() else {
            self.buffer(state, update);
            return Ok(SyncOutcome::Buffered);
        };
        let current = book.last_update_id();
        if update.last_update_id() <= current {
            return Ok(SyncOutcome::Ignored);
        }
        // `current` is below the update's last id, so this cannot overflow.
        let next = current + 1;

        let continues = if state.fresh {
            update.first_update_id() <= next && next <= update.last_update_id()
        } else {
            update.first_update_id() == next
        };
        if !continues {
            warn!(
                symbol = %self.symbol,
                expected = next,
                first = update.first_update_id(),
                last = update.last_update_id(),
                "Depth update gap, resynchronizing"
            );
            state.book = None;
            state.fresh = false;
            self.buffer(state, update);
            return Ok(SyncOutcome::OutOfSync);
        }

        book.modify(update.last_update_id(), update.bids(), update.asks())?;
        state.fresh = false;
        let _ = self.tx.send(self.notification(state));
        Ok(SyncOutcome::Applied)
    }

    fn buffer(&self, state: &mut State, update: &DepthUpdate) {
        if state.pending.len() >= self.max_pending {
            state.pending.pop_front();
            warn!(
                symbol = %self.symbol,
                max_pending = self.max_pending,
                "Pending depth buffer full, dropping oldest update"
            );
        }
        state.pending.push_back(update.clone());
    }

    fn notification(&self, state: &State) -> BookUpdate {
        BookUpdate {
            symbol: self.symbol.clone(),
            last_update_id: state.book.as_ref().map_or(0, OrderBook::last_update_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::testkit::domain::{depth_update, snapshot};
    use crate::testkit::snapshot::ScriptedSnapshots;

    fn cache() -> OrderBookCache {
        OrderBookCache::new(Symbol::new("BTCUSDT"), 100, Duration::from_millis(50))
    }

    fn seeded(id: u64) -> ScriptedSnapshots {
        ScriptedSnapshots::with_results(vec![Ok(snapshot(
            "BTCUSDT",
            id,
            &[("100", "1")],
            &[("101", "1")],
        ))])
    }

    #[test]
    fn updates_are_buffered_before_a_snapshot() {
        let cache = cache();

        let outcome = cache.apply(&depth_update("BTCUSDT", 1, 2, &[], &[])).unwrap();

        assert_eq!(outcome, SyncOutcome::Buffered);
        assert_eq!(cache.pending(), 1);
        assert!(cache.book(10).is_none());
    }

    #[test]
    fn other_symbols_are_ignored() {
        let cache = cache();
        let outcome = cache.apply(&depth_update("ETHUSDT", 1, 2, &[], &[])).unwrap();
        assert_eq!(outcome, SyncOutcome::Ignored);
        assert_eq!(cache.pending(), 0);
    }

    #[tokio::test]
    async fn synchronize_replays_buffered_updates() {
        let cache = cache();
        cache.apply(&depth_update("BTCUSDT", 95, 100, &[("99", "5")], &[])).unwrap();
        cache.apply(&depth_update("BTCUSDT", 101, 103, &[("100", "0")], &[])).unwrap();
        cache.apply(&depth_update("BTCUSDT", 104, 104, &[], &[("102", "2")])).unwrap();

        let id = cache.synchronize(&seeded(101)).await.unwrap();

        assert_eq!(id, 104);
        let book = cache.snapshot().unwrap();
        assert!(book.best_bid().is_none());
        assert_eq!(book.quantity(dec!(102)), dec!(2));
        assert_eq!(book.quantity(dec!(99)), dec!(0));
        assert_eq!(cache.pending(), 0);
    }

    #[tokio::test]
    async fn snapshot_older_than_buffer_is_out_of_sync() {
        let cache = cache();
        cache.apply(&depth_update("BTCUSDT", 120, 125, &[], &[])).unwrap();
        cache.apply(&depth_update("BTCUSDT", 126, 130, &[], &[])).unwrap();

        let result = cache.synchronize(&seeded(100)).await;

        assert!(matches!(result, Err(Error::OutOfSync(_))));
        assert!(!cache.is_synchronized());
        assert_eq!(cache.pending(), 2);

        let id = cache.synchronize(&seeded(122)).await.unwrap();
        assert_eq!(id, 130);
    }

    #[tokio::test]
    async fn live_updates_must_be_contiguous() {
        let cache = cache();
        cache.synchronize(&seeded(10)).await.unwrap();

        assert_eq!(
            cache.apply(&depth_update("BTCUSDT", 9, 12, &[], &[])).unwrap(),
            SyncOutcome::Applied
        );
        assert_eq!(
            cache.apply(&depth_update("BTCUSDT", 5, 12, &[], &[])).unwrap(),
            SyncOutcome::Ignored
        );
        assert_eq!(
            cache.apply(&depth_update("BTCUSDT", 13, 14, &[], &[])).unwrap(),
            SyncOutcome::Applied
        );
        assert_eq!(
            cache.apply(&depth_update("BTCUSDT", 16, 17, &[], &[])).unwrap(),
            SyncOutcome::OutOfSync
        );
        assert!(!cache.is_synchronized());
        assert_eq!(cache.pending(), 1);
    }

    #[tokio::test]
    async fn invalid_levels_leave_the_book_unchanged() {
        let cache = cache();
        cache.synchronize(&seeded(10)).await.unwrap();

        let result = cache.apply(&depth_update("BTCUSDT", 11, 11, &[("0", "1")], &[]));

        assert!(matches!(result, Err(Error::Domain(_))));
        assert_eq!(cache.last_update_id(), Some(10));
    }

    #[tokio::test]
    async fn readers_get_truncated_copies() {
        let cache = cache();
        let provider = ScriptedSnapshots::with_results(vec![Ok(snapshot(
            "BTCUSDT",
            1,
            &[("100", "1"), ("99", "2"), ("98", "3")],
            &[("101", "1"), ("102", "2")],
        ))]);
        cache.synchronize(&provider).await.unwrap();

        let view = cache.book(1).unwrap();
        cache.apply(&depth_update("BTCUSDT", 2, 2, &[("100", "0")], &[])).unwrap();

        assert_eq!(view.bids().len(), 1);
        assert_eq!(view.best_bid().unwrap().price(), dec!(100));
        assert_eq!(cache.book(10).unwrap().best_bid().unwrap().price(), dec!(99));
    }

    #[tokio::test]
    async fn applied_updates_are_broadcast() {
        let cache = cache();
        cache.synchronize(&seeded(10)).await.unwrap();
        let mut updates = cache.subscribe();

        cache.apply(&depth_update("BTCUSDT", 11, 12, &[], &[])).unwrap();

        let update = updates.recv().await.unwrap();
        assert_eq!(update.last_update_id, 12);
        assert_eq!(update.symbol.as_str(), "BTCUSDT");
    }

    #[test]
    fn pending_buffer_drops_the_oldest_update_when_full() {
        let cache = cache().with_max_pending(2);

        for id in 1..=3 {
            cache.apply(&depth_update("BTCUSDT", id, id, &[], &[])).unwrap();
        }

        assert_eq!(cache.pending(), 2);
        let ids: Vec<u64> = cache
            .state
            .read()
            .pending
            .iter()
            .map(DepthUpdate::first_update_id)
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn book_at_the_last_update_id_ignores_further_updates() {
        let cache = cache();
        cache.synchronize(&seeded(u64::MAX)).await.unwrap();

        let outcome = cache
            .apply(&depth_update("BTCUSDT", u64::MAX, u64::MAX, &[("100", "0")], &[]))
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Ignored);
        assert_eq!(cache.last_update_id(), Some(u64::MAX));
        assert_eq!(cache.snapshot().unwrap().quantity(dec!(100)), dec!(1));
    }

    #[tokio::test(start_paused = true)]
    async fn run_resynchronizes_after_a_gap() {
        let cache = Arc::new(cache());
        let provider = Arc::new(ScriptedSnapshots::with_results(vec![
            Err(Error::Connection("timeout".into())),
            Ok(snapshot("BTCUSDT", 10, &[("100", "1")], &[("101", "1")])),
            Ok(snapshot("BTCUSDT", 20, &[("100", "1")], &[("101", "1")])),
        ]));
        let token = CancellationToken::new();
        let task = {
            let cache = Arc::clone(&cache);
            let provider: Arc<dyn SnapshotProvider> = provider.clone();
            let token = token.clone();
            tokio::spawn(async move { cache.run(provider, token).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.last_update_id(), Some(10));

        cache.apply(&depth_update("BTCUSDT", 15, 16, &[], &[])).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.last_update_id(), Some(20));
        assert_eq!(provider.call_count(), 3);

        token.cancel();
        task.await.unwrap();
    }
}
