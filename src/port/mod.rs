//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports define the seams between the streaming engine and the systems it
//! talks to. Adapters implement them; the engine only ever sees the traits.
//!
//! # Architecture
//!
//! ```text
//!        typed clients (inbound)            transport / REST (outbound)
//!     ┌───────────────────────────┐       ┌───────────────────────────┐
//!     │ StreamClient              │       │ Transport                 │
//!     │ StreamObserver            │◄──────┤ TransportSession          │
//!     └───────────────────────────┘       │ SnapshotProvider          │
//!                                         └───────────────────────────┘
//! ```
//!
//! # Available Ports
//!
//! - [`Transport`], [`TransportSession`] - Duplex connection primitive
//! - [`SnapshotProvider`] - Point-in-time order book snapshots
//! - [`StreamClient`] - Typed decoder bound to a set of stream names
//! - [`StreamObserver`] - Receiver of raw `(stream, json)` messages

pub mod inbound;
pub mod outbound;

pub use inbound::client::{EventCallback, StreamClient, StreamObserver};
pub use outbound::snapshot::{BookSnapshot, SnapshotProvider};
pub use outbound::transport::{Frame, Transport, TransportSession};
