//! Binance spot market-data adapter.
//!
//! - [`websocket`] - The [`Transport`](crate::port::Transport) over `tokio-tungstenite`
//! - [`rest`] - Order-book snapshots over `reqwest`
//! - [`client`] - Typed depth and trade clients
//! - [`dto`] - Wire formats

pub mod client;
pub mod dto;
pub mod rest;
pub mod websocket;

pub use client::{DepthClient, DepthTopic, TradeClient, UpdateSpeed};
pub use rest::RestSnapshotProvider;
pub use websocket::WebSocketTransport;
