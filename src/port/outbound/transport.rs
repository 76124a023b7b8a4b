//! Duplex transport port.
//!
//! The engine never interprets wire bytes beyond pulling text frames out of a
//! session; connect/send/receive/close live behind these traits.

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

/// One inbound unit from a transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text payload (JSON in practice).
    Text(String),
    /// The remote side ended the session, with an optional reason.
    Closed(Option<String>),
}

/// Opens duplex sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open one session to `uri`.
    async fn connect(&self, uri: &Url) -> Result<Box<dyn TransportSession>>;
}

/// One live attempt of the underlying connection.
///
/// `receive` must be cancel-safe: the engine races it against the session's
/// cancellation token and drops the future when the session is aborted.
#[async_trait]
pub trait TransportSession: Send {
    /// Wait for the next frame.
    async fn receive(&mut self) -> Result<Frame>;

    /// Close the session. Called once, after the receive loop has stopped.
    async fn close(&mut self) -> Result<()>;
}
