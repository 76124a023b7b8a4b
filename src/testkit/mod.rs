//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`transport`] - Channel-driven mock [`Transport`](crate::port::Transport)
//! - [`snapshot`] - Scripted [`SnapshotProvider`](crate::port::SnapshotProvider)
//! - [`observer`] - Observers and callbacks that record what they receive
//! - [`domain`] - Builders for domain primitives and exchange JSON payloads
//! - [`config`] - Canonical test configurations with short timings

pub mod config;
pub mod domain;
pub mod observer;
pub mod snapshot;
pub mod transport;
