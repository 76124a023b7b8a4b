//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe the engine's infrastructure dependencies: the
//! duplex transport and the REST snapshot source.

pub mod snapshot;
pub mod transport;
