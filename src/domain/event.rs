//! Decoded stream events.
//!
//! Every typed client raises the same [`StreamEvent`] envelope; the feed kind
//! is carried by the [`EventPayload`] discriminant and switched on at the
//! dispatch boundary.

use chrono::{DateTime, Utc};

use super::book::PriceLevel;
use super::error::DomainError;
use super::id::{StreamName, Symbol};
use super::money::{Price, Quantity};

/// Incremental order-book diff for one symbol.
///
/// A delta quantity of zero means "remove this price level".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthUpdate {
    symbol: Symbol,
    event_time: DateTime<Utc>,
    first_update_id: u64,
    last_update_id: u64,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

impl DepthUpdate {
    /// Creates a depth update, validating the update id range.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvertedUpdateRange`] if
    /// `first_update_id > last_update_id`.
    pub fn try_new(
        symbol: Symbol,
        event_time: DateTime<Utc>,
        first_update_id: u64,
        last_update_id: u64,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Result<Self, DomainError> {
        if first_update_id > last_update_id {
            return Err(DomainError::InvertedUpdateRange {
                first: first_update_id,
                last: last_update_id,
            });
        }
        Ok(Self {
            symbol,
            event_time,
            first_update_id,
            last_update_id,
            bids,
            asks,
        })
    }

    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[must_use]
    pub const fn event_time(&self) -> DateTime<Utc> {
        self.event_time
    }

    #[must_use]
    pub const fn first_update_id(&self) -> u64 {
        self.first_update_id
    }

    #[must_use]
    pub const fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    #[must_use]
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    #[must_use]
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub symbol: Symbol,
    pub id: u64,
    pub price: Price,
    pub quantity: Quantity,
    pub trade_time: DateTime<Utc>,
    /// True when the buyer was the resting (maker) side.
    pub buyer_is_maker: bool,
}

/// Feed-specific payload of a [`StreamEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Depth(DepthUpdate),
    Trade(Trade),
}

/// A decoded message raised by a typed client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// The stream the message arrived on.
    pub stream: StreamName,
    /// Local receive time.
    pub received_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl StreamEvent {
    #[must_use]
    pub fn new(stream: StreamName, payload: EventPayload) -> Self {
        Self {
            stream,
            received_at: Utc::now(),
            payload,
        }
    }

    /// Symbol the payload refers to.
    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        match &self.payload {
            EventPayload::Depth(update) => update.symbol(),
            EventPayload::Trade(trade) => &trade.symbol,
        }
    }

    /// The depth update, if this is a depth event.
    #[must_use]
    pub fn as_depth(&self) -> Option<&DepthUpdate> {
        match &self.payload {
            EventPayload::Depth(update) => Some(update),
            EventPayload::Trade(_) => None,
        }
    }

    /// The trade, if this is a trade event.
    #[must_use]
    pub fn as_trade(&self) -> Option<&Trade> {
        match &self.payload {
            EventPayload::Trade(trade) => Some(trade),
            EventPayload::Depth(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_update_rejects_inverted_range() {
        let err = DepthUpdate::try_new(Symbol::new("BTCUSDT"), Utc::now(), 5, 4, vec![], vec![])
            .unwrap_err();
        assert_eq!(err, DomainError::InvertedUpdateRange { first: 5, last: 4 });
    }

    #[test]
    fn depth_update_accepts_single_id_range() {
        let update =
            DepthUpdate::try_new(Symbol::new("BTCUSDT"), Utc::now(), 7, 7, vec![], vec![]).unwrap();
        assert_eq!(update.first_update_id(), update.last_update_id());
    }
}
