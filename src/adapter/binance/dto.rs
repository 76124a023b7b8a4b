//! Binance market-data wire types.
//!
//! Prices and quantities arrive as decimal strings; `rust_decimal`'s serde
//! support parses them directly, so a malformed level fails the whole
//! message instead of being skipped.
//!
//! Depth diff:
//! ```json
//! {"e":"depthUpdate","E":1700000000000,"s":"BTCUSDT","U":157,"u":160,"b":[["10000.0","1.5"]],"a":[]}
//! ```
//!
//! Trade:
//! ```json
//! {"e":"trade","E":1700000000000,"s":"BTCUSDT","t":12345,"p":"10000.0","q":"0.1","T":1700000000000,"m":true,"M":true}
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{
    book::PriceLevel,
    event::{DepthUpdate, Trade},
    id::Symbol,
    money::{Price, Quantity},
};
use crate::error::Result;
use crate::port::BookSnapshot;

/// `[price, quantity]` pair.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LevelDto(pub Price, pub Quantity);

impl From<LevelDto> for PriceLevel {
    fn from(LevelDto(price, quantity): LevelDto) -> Self {
        Self::new(price, quantity)
    }
}

fn levels(raw: Vec<LevelDto>) -> Vec<PriceLevel> {
    raw.into_iter().map(PriceLevel::from).collect()
}

fn millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// `<symbol>@depth` payload.
#[derive(Debug, Deserialize)]
pub struct DepthUpdateDto {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub last_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<LevelDto>,
    #[serde(rename = "a")]
    pub asks: Vec<LevelDto>,
}

impl DepthUpdateDto {
    /// Convert into the domain diff.
    ///
    /// # Errors
    ///
    /// Returns a domain error if the update id range is inverted.
    pub fn into_domain(self) -> Result<DepthUpdate> {
        Ok(DepthUpdate::try_new(
            Symbol::new(&self.symbol),
            millis(self.event_time),
            self.first_update_id,
            self.last_update_id,
            levels(self.bids),
            levels(self.asks),
        )?)
    }
}

/// `<symbol>@trade` payload.
#[derive(Debug, Deserialize)]
pub struct TradeDto {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t")]
    pub id: u64,
    #[serde(rename = "p")]
    pub price: Price,
    #[serde(rename = "q")]
    pub quantity: Quantity,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

impl From<TradeDto> for Trade {
    fn from(dto: TradeDto) -> Self {
        Self {
            symbol: Symbol::new(&dto.symbol),
            id: dto.id,
            price: dto.price,
            quantity: dto.quantity,
            trade_time: millis(dto.trade_time),
            buyer_is_maker: dto.buyer_is_maker,
        }
    }
}

/// `GET /api/v3/depth` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshotDto {
    pub last_update_id: u64,
    pub bids: Vec<LevelDto>,
    pub asks: Vec<LevelDto>,
}

impl DepthSnapshotDto {
    /// The response carries no symbol; the caller supplies the one it asked
    /// for.
    #[must_use]
    pub fn into_snapshot(self, symbol: Symbol) -> BookSnapshot {
        BookSnapshot {
            symbol,
            last_update_id: self.last_update_id,
            bids: levels(self.bids),
            asks: levels(self.asks),
        }
    }
}
