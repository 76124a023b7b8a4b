//! WebSocket transport.
//!
//! Each [`Transport::connect`] opens a fresh socket; the multiplexer drives
//! the receive loop and closes the session when it is done with it.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::Result;
use crate::port::{Frame, Transport, TransportSession};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Transport`] over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, uri: &Url) -> Result<Box<dyn TransportSession>> {
        info!(url = %uri, "Connecting to WebSocket");
        let (ws, response) = connect_async(uri.as_str()).await?;
        info!(status = %response.status(), "WebSocket connected");
        Ok(Box::new(WebSocketSession { ws, closed: false }))
    }
}

/// One live socket.
pub struct WebSocketSession {
    ws: Socket,
    closed: bool,
}

#[async_trait]
impl TransportSession for WebSocketSession {
    async fn receive(&mut self) -> Result<Frame> {
        loop {
            let Some(message) = self.ws.next().await else {
                self.closed = true;
                return Ok(Frame::Closed(None));
            };

            match message? {
                Message::Text(text) => {
                    trace!(bytes = text.len(), "Received WebSocket text frame");
                    return Ok(Frame::Text(text));
                }
                // Server pings every few minutes and drops sockets that stay silent.
                Message::Ping(data) => {
                    trace!("Received WebSocket ping");
                    self.ws.send(Message::Pong(data)).await?;
                }
                Message::Close(frame) => {
                    info!(frame = ?frame, "WebSocket closed by server");
                    self.closed = true;
                    return Ok(Frame::Closed(frame.map(|f| f.reason.to_string())));
                }
                // Binary, Pong and raw frames carry nothing for us.
                _ => {}
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("Closing WebSocket");
        self.ws.close(None).await?;
        Ok(())
    }
}
