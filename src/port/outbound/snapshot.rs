//! REST order book snapshot port.

use async_trait::async_trait;

use crate::domain::{book::PriceLevel, id::Symbol};
use crate::error::Result;

/// Point-in-time order book state used to seed an
/// [`OrderBook`](crate::domain::book::OrderBook).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    pub last_update_id: u64,
    /// Bid levels, best first.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first.
    pub asks: Vec<PriceLevel>,
}

/// Fetches order book snapshots.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Fetch a snapshot of `symbol` with at most `limit` levels per side.
    async fn order_book_snapshot(&self, symbol: &Symbol, limit: u32) -> Result<BookSnapshot>;
}
