//! Runtime caches maintained from stream events.
//!
//! - [`book::OrderBookCache`]: Local order book kept in sync from depth diffs

pub mod book;

pub use book::{BookUpdate, OrderBookCache, SyncOutcome};
