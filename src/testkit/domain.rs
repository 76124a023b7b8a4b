//! Builders for domain primitives used across tests.
//!
//! Provides concise factory functions for stream names, symbols, book
//! levels and exchange-shaped JSON so tests focus on assertions rather than
//! construction boilerplate. Prices are decimal strings, as on the wire.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::domain::{DepthUpdate, EventPayload, PriceLevel, StreamEvent, StreamName, Symbol, Trade};
use crate::port::BookSnapshot;

/// Create a [`StreamName`].
pub fn stream(name: &str) -> StreamName {
    StreamName::from(name)
}

/// Create several [`StreamName`]s.
pub fn streams(names: &[&str]) -> Vec<StreamName> {
    names.iter().map(|n| StreamName::from(*n)).collect()
}

pub fn symbol(s: &str) -> Symbol {
    Symbol::new(s)
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Create a [`PriceLevel`] from decimal strings.
pub fn level(price: &str, quantity: &str) -> PriceLevel {
    PriceLevel::new(dec(price), dec(quantity))
}

/// Create price levels from `(price, quantity)` string pairs.
pub fn levels(pairs: &[(&str, &str)]) -> Vec<PriceLevel> {
    pairs.iter().map(|(p, q)| level(p, q)).collect()
}

/// Create a [`BookSnapshot`].
pub fn snapshot(
    symbol_name: &str,
    last_update_id: u64,
    bids: &[(&str, &str)],
    asks: &[(&str, &str)],
) -> BookSnapshot {
    BookSnapshot {
        symbol: symbol(symbol_name),
        last_update_id,
        bids: levels(bids),
        asks: levels(asks),
    }
}

/// Create a [`DepthUpdate`] covering ids `first..=last`.
pub fn depth_update(
    symbol_name: &str,
    first: u64,
    last: u64,
    bids: &[(&str, &str)],
    asks: &[(&str, &str)],
) -> DepthUpdate {
    DepthUpdate::try_new(
        symbol(symbol_name),
        Utc::now(),
        first,
        last,
        levels(bids),
        levels(asks),
    )
    .unwrap()
}

fn wire_levels(pairs: &[(&str, &str)]) -> Value {
    Value::Array(pairs.iter().map(|(p, q)| json!([p, q])).collect())
}

/// Exchange-shaped depth diff payload.
pub fn depth_json(
    symbol_name: &str,
    first: u64,
    last: u64,
    bids: &[(&str, &str)],
    asks: &[(&str, &str)],
) -> Value {
    json!({
        "e": "depthUpdate",
        "E": 1_700_000_000_000_u64,
        "s": symbol_name,
        "U": first,
        "u": last,
        "b": wire_levels(bids),
        "a": wire_levels(asks),
    })
}

/// A decoded trade event on `stream_name`.
pub fn trade_event(stream_name: &str, symbol_name: &str, id: u64) -> StreamEvent {
    StreamEvent::new(
        stream(stream_name),
        EventPayload::Trade(Trade {
            symbol: symbol(symbol_name),
            id,
            price: dec("100"),
            quantity: dec("1"),
            trade_time: Utc::now(),
            buyer_is_maker: false,
        }),
    )
}

/// Exchange-shaped trade payload.
pub fn trade_json(symbol_name: &str, id: u64, price: &str, quantity: &str) -> Value {
    json!({
        "e": "trade",
        "E": 1_700_000_000_000_u64,
        "s": symbol_name,
        "t": id,
        "p": price,
        "q": quantity,
        "T": 1_700_000_000_000_u64,
        "m": false,
        "M": true,
    })
}

/// Exchange-shaped REST depth snapshot body.
pub fn snapshot_json(last_update_id: u64, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> Value {
    json!({
        "lastUpdateId": last_update_id,
        "bids": wire_levels(bids),
        "asks": wire_levels(asks),
    })
}

/// Wrap a payload in a combined-stream envelope.
pub fn envelope(stream_name: &str, data: Value) -> Value {
    json!({ "stream": stream_name, "data": data })
}
