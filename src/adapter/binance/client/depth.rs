//! Order-book diff client.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use super::CallbackRegistry;
use crate::adapter::binance::dto::DepthUpdateDto;
use crate::domain::{
    event::{EventPayload, StreamEvent},
    id::{StreamName, Symbol},
};
use crate::error::Result;
use crate::port::{EventCallback, StreamClient};

/// Push cadence of a depth stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UpdateSpeed {
    /// One diff per second.
    #[default]
    Standard,
    /// One diff every 100 ms.
    Fast,
}

/// What a [`DepthClient`] subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepthTopic {
    pub symbol: Symbol,
    pub speed: Option<UpdateSpeed>,
}

impl DepthTopic {
    #[must_use]
    pub const fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            speed: None,
        }
    }

    #[must_use]
    pub fn with_speed(mut self, speed: UpdateSpeed) -> Self {
        self.speed = Some(speed);
        self
    }

    /// `btcusdt@depth` or `btcusdt@depth@100ms`.
    #[must_use]
    pub fn stream_name(&self) -> StreamName {
        let prefix = self.symbol.stream_prefix();
        match self.speed.unwrap_or_default() {
            UpdateSpeed::Standard => StreamName::new(format!("{prefix}@depth")),
            UpdateSpeed::Fast => StreamName::new(format!("{prefix}@depth@100ms")),
        }
    }
}

impl From<Symbol> for DepthTopic {
    fn from(symbol: Symbol) -> Self {
        Self::new(symbol)
    }
}

/// Decodes depth diffs into [`StreamEvent`]s carrying
/// [`EventPayload::Depth`].
#[derive(Default)]
pub struct DepthClient {
    registry: CallbackRegistry,
}

impl DepthClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every decoded depth event, regardless of callbacks.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.registry.subscribe()
    }
}

impl StreamClient for DepthClient {
    type Topic = DepthTopic;

    fn observed_streams(&self) -> BTreeSet<StreamName> {
        self.registry.observed()
    }

    fn subscribe(&self, topic: &DepthTopic, callback: Option<EventCallback>) -> Result<()> {
        self.registry.add(topic.stream_name(), callback);
        Ok(())
    }

    fn unsubscribe(&self, topic: &DepthTopic, callback: Option<&EventCallback>) -> Result<()> {
        self.registry.remove(&topic.stream_name(), callback);
        Ok(())
    }

    fn handle_message(&self, stream: &StreamName, data: &Value) -> Result<()> {
        let update = DepthUpdateDto::deserialize(data)?.into_domain()?;
        trace!(
            %stream,
            first = update.first_update_id(),
            last = update.last_update_id(),
            "Depth update"
        );
        self.registry
            .raise(StreamEvent::new(stream.clone(), EventPayload::Depth(update)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testkit::domain::{depth_json, symbol};
    use crate::testkit::observer::recording_callback;
    use serde_json::json;

    fn topic(s: &str) -> DepthTopic {
        DepthTopic::new(symbol(s))
    }

    #[test]
    fn stream_name_follows_speed() {
        assert_eq!(topic("BTCUSDT").stream_name().as_str(), "btcusdt@depth");
        assert_eq!(
            topic("BTCUSDT")
                .with_speed(UpdateSpeed::Fast)
                .stream_name()
                .as_str(),
            "btcusdt@depth@100ms"
        );
        assert_eq!(
            topic("BTCUSDT")
                .with_speed(UpdateSpeed::Standard)
                .stream_name(),
            topic("BTCUSDT").stream_name()
        );
    }

    #[test]
    fn speeds_are_distinct_streams() {
        let client = DepthClient::new();
        client.subscribe(&topic("BTCUSDT"), None).unwrap();
        client
            .subscribe(&topic("BTCUSDT").with_speed(UpdateSpeed::Fast), None)
            .unwrap();
        assert_eq!(client.observed_streams().len(), 2);
    }

    #[test]
    fn decoded_update_reaches_callback_and_listeners() {
        let client = DepthClient::new();
        let (callback, seen) = recording_callback();
        client.subscribe(&topic("BTCUSDT"), Some(callback)).unwrap();
        let mut listener = client.events();

        let stream = StreamName::from("btcusdt@depth");
        client
            .handle_message(&stream, &depth_json("BTCUSDT", 5, 7, &[("100", "1")], &[]))
            .unwrap();

        let seen = seen.lock();
        let update = seen[0].as_depth().unwrap();
        assert_eq!(update.first_update_id(), 5);
        assert_eq!(update.last_update_id(), 7);
        assert_eq!(seen[0].stream, stream);
        assert!(listener.try_recv().unwrap().as_depth().is_some());
    }

    #[test]
    fn undecodable_payload_is_a_json_error() {
        let client = DepthClient::new();
        let result = client.handle_message(&StreamName::from("btcusdt@depth"), &json!({"u": 1}));
        assert!(matches!(result, Err(Error::Json(_))));
    }
}
