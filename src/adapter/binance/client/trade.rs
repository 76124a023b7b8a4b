//! Trade print client.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use super::CallbackRegistry;
use crate::adapter::binance::dto::TradeDto;
use crate::domain::{
    event::{EventPayload, StreamEvent, Trade},
    id::{StreamName, Symbol},
};
use crate::error::Result;
use crate::port::{EventCallback, StreamClient};

/// Decodes `<symbol>@trade` messages into [`StreamEvent`]s carrying
/// [`EventPayload::Trade`].
#[derive(Default)]
pub struct TradeClient {
    registry: CallbackRegistry,
}

impl TradeClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stream_name(symbol: &Symbol) -> StreamName {
        StreamName::new(format!("{}@trade", symbol.stream_prefix()))
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.registry.subscribe()
    }
}

impl StreamClient for TradeClient {
    type Topic = Symbol;

    fn observed_streams(&self) -> BTreeSet<StreamName> {
        self.registry.observed()
    }

    fn subscribe(&self, symbol: &Symbol, callback: Option<EventCallback>) -> Result<()> {
        self.registry.add(Self::stream_name(symbol), callback);
        Ok(())
    }

    fn unsubscribe(&self, symbol: &Symbol, callback: Option<&EventCallback>) -> Result<()> {
        self.registry.remove(&Self::stream_name(symbol), callback);
        Ok(())
    }

    fn handle_message(&self, stream: &StreamName, data: &Value) -> Result<()> {
        let trade = Trade::from(TradeDto::deserialize(data)?);
        trace!(%stream, id = trade.id, price = %trade.price, "Trade");
        self.registry
            .raise(StreamEvent::new(stream.clone(), EventPayload::Trade(trade)));
        Ok(())
    }
}
