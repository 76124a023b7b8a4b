//! Application services (use cases).
//!
//! These services consume typed stream events and maintain derived state on
//! top of the streaming engine.

pub mod cache;
