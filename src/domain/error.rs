//! Domain validation errors for core domain types.
//!
//! These errors are returned when an order-book mutation or event
//! construction would violate a domain invariant.

use thiserror::Error;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Price levels must carry a strictly positive price.
    #[error("price must be positive, got {price}")]
    NonPositivePrice {
        /// The invalid price that was provided.
        price: rust_decimal::Decimal,
    },

    /// Snapshot levels cannot carry a negative quantity.
    #[error("quantity must not be negative, got {quantity}")]
    NegativeQuantity {
        /// The invalid quantity that was provided.
        quantity: rust_decimal::Decimal,
    },

    /// The book's update id never moves backwards.
    #[error("update id {update_id} is older than the book's {current}")]
    StaleUpdate {
        /// The rejected update id.
        update_id: u64,
        /// The book's current update id.
        current: u64,
    },

    /// A depth update spans an inverted id range.
    #[error("first update id {first} exceeds last update id {last}")]
    InvertedUpdateRange {
        /// First update id in the event.
        first: u64,
        /// Last update id in the event.
        last: u64,
    },
}
