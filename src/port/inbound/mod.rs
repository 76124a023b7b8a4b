//! Inbound (driving) ports consumed by the streaming engine.
//!
//! # Modules
//!
//! - [`client`]: Typed stream clients and raw message observers

pub mod client;
