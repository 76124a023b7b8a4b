//! Order book types for market depth representation.
//!
//! This module provides types for representing order book state:
//!
//! - [`PriceLevel`] - A single price level with quantity
//! - [`BookTop`] - Best bid and best ask pair
//! - [`OrderBook`] - Bid/ask levels for one symbol, advanced by sequenced diffs
//!
//! # Order Book Structure
//!
//! An order book has two sides:
//! - **Bids**: Buy orders, best (highest) price first
//! - **Asks**: Sell orders, best (lowest) price first
//!
//! Levels are stored in ordered maps keyed by price, so a level is either
//! present with a positive quantity or absent. A diff with a zero quantity
//! removes the level rather than retaining it.
//!
//! # Examples
//!
//! ```
//! use feedmux::domain::book::{OrderBook, PriceLevel};
//! use feedmux::domain::id::Symbol;
//! use rust_decimal_macros::dec;
//!
//! let mut book = OrderBook::new(
//!     Symbol::new("BTCUSDT"),
//!     100,
//!     vec![PriceLevel::new(dec!(10000), dec!(1))],
//!     vec![PriceLevel::new(dec!(10010), dec!(1))],
//! )
//! .unwrap();
//!
//! book.modify(
//!     101,
//!     &[PriceLevel::new(dec!(10000), dec!(0))],
//!     &[PriceLevel::new(dec!(10020), dec!(2))],
//! )
//! .unwrap();
//!
//! assert!(book.bids().is_empty());
//! assert_eq!(book.asks().len(), 2);
//! assert_eq!(book.last_update_id(), 101);
//! assert!(book.top().is_none());
//! ```

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::error::DomainError;
use super::id::Symbol;
use super::money::{Price, Quantity};

/// A single price level in an order book.
///
/// Represents aggregated orders at a specific price point. In a diff, a
/// quantity of zero means "remove this level".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    /// The price at this level.
    price: Price,
    /// Total quantity available at this price.
    quantity: Quantity,
}

impl PriceLevel {
    /// Creates a new price level.
    #[must_use]
    pub const fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }

    /// Returns the price at this level.
    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    /// Returns the total quantity available at this level.
    #[must_use]
    pub const fn quantity(&self) -> Quantity {
        self.quantity
    }
}

impl From<(Price, Quantity)> for PriceLevel {
    fn from((price, quantity): (Price, Quantity)) -> Self {
        Self::new(price, quantity)
    }
}

/// Top of book: the best bid and best ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookTop {
    bid: PriceLevel,
    ask: PriceLevel,
}

impl BookTop {
    /// Returns the best (highest) bid.
    #[must_use]
    pub const fn bid(&self) -> PriceLevel {
        self.bid
    }

    /// Returns the best (lowest) ask.
    #[must_use]
    pub const fn ask(&self) -> PriceLevel {
        self.ask
    }

    /// Midpoint between best bid and best ask.
    #[must_use]
    pub fn mid_price(&self) -> Price {
        (self.bid.price + self.ask.price) / Decimal::TWO
    }

    /// Difference between best ask and best bid.
    #[must_use]
    pub fn spread(&self) -> Price {
        self.ask.price - self.bid.price
    }
}

/// Order book for a single symbol.
///
/// Created from a point-in-time snapshot and advanced in place by
/// [`modify`](Self::modify) for each diff that the caller has already
/// validated as contiguous. `Clone` produces an independent deep copy, which
/// is how a consistent view is handed to readers while the original keeps
/// mutating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBook {
    symbol: Symbol,
    last_update_id: u64,
    bids: BTreeMap<Price, Quantity>,
    asks: BTreeMap<Price, Quantity>,
}

impl OrderBook {
    /// Creates a book from snapshot levels.
    ///
    /// Levels with a zero quantity are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if any level has a non-positive price or a negative
    /// quantity.
    pub fn new(
        symbol: Symbol,
        last_update_id: u64,
        bids: impl IntoIterator<Item = PriceLevel>,
        asks: impl IntoIterator<Item = PriceLevel>,
    ) -> Result<Self, DomainError> {
        let mut book = Self::empty(symbol, last_update_id);
        for level in bids {
            validate_snapshot_level(&level)?;
            if level.quantity > Decimal::ZERO {
                book.bids.insert(level.price, level.quantity);
            }
        }
        for level in asks {
            validate_snapshot_level(&level)?;
            if level.quantity > Decimal::ZERO {
                book.asks.insert(level.price, level.quantity);
            }
        }
        Ok(book)
    }

    /// Creates a book with no levels.
    #[must_use]
    pub fn empty(symbol: Symbol, last_update_id: u64) -> Self {
        Self {
            symbol,
            last_update_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    /// Returns the symbol this book represents.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Returns the sequence number of the last applied update.
    #[must_use]
    pub const fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    /// Returns all bid levels, best (highest) price first.
    #[must_use]
    pub fn bids(&self) -> Vec<PriceLevel> {
        self.bids
            .iter()
            .rev()
            .map(|(p, q)| PriceLevel::new(*p, *q))
            .collect()
    }

    /// Returns all ask levels, best (lowest) price first.
    #[must_use]
    pub fn asks(&self) -> Vec<PriceLevel> {
        self.asks
            .iter()
            .map(|(p, q)| PriceLevel::new(*p, *q))
            .collect()
    }

    /// Returns the best bid (highest buy price).
    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, q)| PriceLevel::new(*p, *q))
    }

    /// Returns the best ask (lowest sell price).
    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .iter()
            .next()
            .map(|(p, q)| PriceLevel::new(*p, *q))
    }

    /// Best bid/ask pair, or `None` if either side is empty.
    #[must_use]
    pub fn top(&self) -> Option<BookTop> {
        Some(BookTop {
            bid: self.best_bid()?,
            ask: self.best_ask()?,
        })
    }

    /// Quantity resting at exactly `price` on either side (zero if absent).
    #[must_use]
    pub fn quantity(&self, price: Price) -> Quantity {
        self.bids
            .get(&price)
            .or_else(|| self.asks.get(&price))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Cumulative quantity of bids at or above `price` plus asks at or below it.
    #[must_use]
    pub fn depth(&self, price: Price) -> Quantity {
        let bids: Quantity = self.bids.range(price..).map(|(_, q)| *q).sum();
        let asks: Quantity = self.asks.range(..=price).map(|(_, q)| *q).sum();
        bids + asks
    }

    /// Cumulative `price * quantity` over the same ranges as [`depth`](Self::depth).
    #[must_use]
    pub fn volume(&self, price: Price) -> Decimal {
        let bids: Decimal = self.bids.range(price..).map(|(p, q)| p * q).sum();
        let asks: Decimal = self.asks.range(..=price).map(|(p, q)| p * q).sum();
        bids + asks
    }

    /// Apply a diff and advance the update id.
    ///
    /// Each delta with a positive quantity upserts its level; a quantity of
    /// zero (or below) removes it. The whole diff is validated before any
    /// level changes, so a rejected diff leaves the book untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::StaleUpdate`] if `last_update_id` is lower than
    /// the current id, or [`DomainError::NonPositivePrice`] for a delta with
    /// a non-positive price.
    pub fn modify(
        &mut self,
        last_update_id: u64,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
    ) -> Result<(), DomainError> {
        if last_update_id < self.last_update_id {
            return Err(DomainError::StaleUpdate {
                update_id: last_update_id,
                current: self.last_update_id,
            });
        }
        if let Some(level) = bids.iter().chain(asks).find(|l| l.price <= Decimal::ZERO) {
            return Err(DomainError::NonPositivePrice { price: level.price });
        }

        apply_deltas(&mut self.bids, bids);
        apply_deltas(&mut self.asks, asks);
        self.last_update_id = last_update_id;
        Ok(())
    }

    /// Deep copy truncated to the best `limit` levels per side.
    #[must_use]
    pub fn clone_with_limit(&self, limit: usize) -> Self {
        Self {
            symbol: self.symbol.clone(),
            last_update_id: self.last_update_id,
            bids: self
                .bids
                .iter()
                .rev()
                .take(limit)
                .map(|(p, q)| (*p, *q))
                .collect(),
            asks: self
                .asks
                .iter()
                .take(limit)
                .map(|(p, q)| (*p, *q))
                .collect(),
        }
    }

    /// Returns true if both sides are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

fn validate_snapshot_level(level: &PriceLevel) -> Result<(), DomainError> {
    if level.price <= Decimal::ZERO {
        return Err(DomainError::NonPositivePrice { price: level.price });
    }
    if level.quantity < Decimal::ZERO {
        return Err(DomainError::NegativeQuantity {
            quantity: level.quantity,
        });
    }
    Ok(())
}

fn apply_deltas(side: &mut BTreeMap<Price, Quantity>, deltas: &[PriceLevel]) {
    for delta in deltas {
        if delta.quantity > Decimal::ZERO {
            side.insert(delta.price, delta.quantity);
        } else {
            side.remove(&delta.price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, quantity: Decimal) -> PriceLevel {
        PriceLevel::new(price, quantity)
    }

    fn seeded() -> OrderBook {
        OrderBook::new(
            Symbol::new("BTCUSDT"),
            100,
            vec![level(dec!(10000), dec!(1)), level(dec!(9990), dec!(2))],
            vec![level(dec!(10010), dec!(1)), level(dec!(10020), dec!(3))],
        )
        .unwrap()
    }

    #[test]
    fn sides_are_ordered_best_first() {
        let book = seeded();
        let bids: Vec<_> = book.bids().iter().map(PriceLevel::price).collect();
        let asks: Vec<_> = book.asks().iter().map(PriceLevel::price).collect();
        assert_eq!(bids, vec![dec!(10000), dec!(9990)]);
        assert_eq!(asks, vec![dec!(10010), dec!(10020)]);
    }

    #[test]
    fn snapshot_skips_zero_quantity_levels() {
        let book = OrderBook::new(
            Symbol::new("BTCUSDT"),
            1,
            vec![level(dec!(10), dec!(0))],
            vec![level(dec!(11), dec!(5))],
        )
        .unwrap();
        assert!(book.bids().is_empty());
        assert_eq!(book.asks().len(), 1);
    }

    #[test]
    fn snapshot_rejects_invalid_levels() {
        let err = OrderBook::new(Symbol::new("X"), 1, vec![level(dec!(0), dec!(1))], vec![])
            .unwrap_err();
        assert!(matches!(err, DomainError::NonPositivePrice { .. }));

        let err = OrderBook::new(Symbol::new("X"), 1, vec![], vec![level(dec!(1), dec!(-1))])
            .unwrap_err();
        assert!(matches!(err, DomainError::NegativeQuantity { .. }));
    }

    #[test]
    fn modify_upserts_and_removes_levels() {
        let mut book = seeded();
        book.modify(
            101,
            &[level(dec!(10000), dec!(0)), level(dec!(9995), dec!(4))],
            &[level(dec!(10010), dec!(7))],
        )
        .unwrap();

        assert_eq!(book.quantity(dec!(10000)), dec!(0));
        assert_eq!(book.quantity(dec!(9995)), dec!(4));
        assert_eq!(book.quantity(dec!(10010)), dec!(7));
        assert_eq!(book.best_bid().unwrap().price(), dec!(9995));
        assert_eq!(book.last_update_id(), 101);
    }

    #[test]
    fn modify_removing_unknown_level_is_noop() {
        let mut book = seeded();
        book.modify(101, &[level(dec!(1), dec!(0))], &[]).unwrap();
        assert_eq!(book.bids().len(), 2);
    }

    #[test]
    fn modify_rejects_regressing_update_id_without_side_effects() {
        let mut book = seeded();
        let before = book.clone();
        let err = book
            .modify(99, &[level(dec!(10000), dec!(0))], &[])
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::StaleUpdate {
                update_id: 99,
                current: 100
            }
        );
        assert_eq!(book, before);
    }

    #[test]
    fn modify_accepts_equal_update_id() {
        let mut book = seeded();
        book.modify(100, &[], &[level(dec!(10030), dec!(1))]).unwrap();
        assert_eq!(book.last_update_id(), 100);
        assert_eq!(book.asks().len(), 3);
    }

    #[test]
    fn modify_rejects_non_positive_price_atomically() {
        let mut book = seeded();
        let before = book.clone();
        let err = book
            .modify(
                101,
                &[level(dec!(10000), dec!(0))],
                &[level(dec!(-1), dec!(1))],
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::NonPositivePrice { .. }));
        assert_eq!(book, before);
    }

    #[test]
    fn depth_and_volume_accumulate_toward_price() {
        let book = seeded();
        // Bids >= 9990 (both) + asks <= 10010 (one)
        assert_eq!(book.depth(dec!(9990)), dec!(3));
        assert_eq!(book.depth(dec!(10010)), dec!(1));
        assert_eq!(book.depth(dec!(10020)), dec!(4));
        assert_eq!(book.volume(dec!(10000)), dec!(10000));
        assert_eq!(
            book.volume(dec!(10020)),
            dec!(10010) + dec!(10020) * dec!(3)
        );
    }

    #[test]
    fn top_reports_mid_and_spread() {
        let top = seeded().top().unwrap();
        assert_eq!(top.bid().price(), dec!(10000));
        assert_eq!(top.ask().price(), dec!(10010));
        assert_eq!(top.mid_price(), dec!(10005));
        assert_eq!(top.spread(), dec!(10));
    }

    #[test]
    fn top_is_none_when_a_side_is_empty() {
        let book = OrderBook::new(Symbol::new("X"), 1, vec![], vec![level(dec!(1), dec!(1))])
            .unwrap();
        assert!(book.top().is_none());
    }

    #[test]
    fn clone_is_independent_of_source() {
        let mut book = seeded();
        let copy = book.clone();
        book.modify(101, &[level(dec!(10000), dec!(0))], &[]).unwrap();

        assert_eq!(copy.best_bid().unwrap().price(), dec!(10000));
        assert_eq!(copy.depth(dec!(9990)), dec!(3));
        assert_eq!(copy.last_update_id(), 100);
    }

    #[test]
    fn clone_with_limit_keeps_best_levels() {
        let book = seeded();
        let top1 = book.clone_with_limit(1);
        assert_eq!(top1.bids(), vec![level(dec!(10000), dec!(1))]);
        assert_eq!(top1.asks(), vec![level(dec!(10010), dec!(1))]);
        assert_eq!(top1.last_update_id(), 100);
    }
}
