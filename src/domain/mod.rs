//! Exchange-agnostic domain types.
//!
//! - [`id`] - Stream and symbol identifiers
//! - [`money`] - Price and quantity aliases
//! - [`book`] - The consistency-checked [`OrderBook`](book::OrderBook)
//! - [`event`] - Decoded stream events and their payloads
//! - [`error`] - Domain validation errors

pub mod book;
pub mod error;
pub mod event;
pub mod id;
pub mod money;

pub use book::{BookTop, OrderBook, PriceLevel};
pub use error::DomainError;
pub use event::{DepthUpdate, EventPayload, StreamEvent, Trade};
pub use id::{StreamName, Symbol};
pub use money::{Price, Quantity};
