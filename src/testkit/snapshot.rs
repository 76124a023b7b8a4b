//! Scripted [`SnapshotProvider`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::Symbol;
use crate::error::{Error, Result};
use crate::port::{BookSnapshot, SnapshotProvider};

/// Returns pre-loaded snapshot results in order.
///
/// Once the script is exhausted every call fails with
/// [`Error::Connection`].
#[derive(Default)]
pub struct ScriptedSnapshots {
    results: Mutex<VecDeque<Result<BookSnapshot>>>,
    calls: Arc<AtomicU32>,
}

impl ScriptedSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(results: Vec<Result<BookSnapshot>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Queue another result.
    pub fn push(&self, result: Result<BookSnapshot>) {
        self.results.lock().push_back(result);
    }

    /// How many snapshots were requested.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotProvider for ScriptedSnapshots {
    async fn order_book_snapshot(&self, symbol: &Symbol, _limit: u32) -> Result<BookSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Connection(format!("no snapshot scripted for {symbol}"))))
    }
}
