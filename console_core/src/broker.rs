//! Broker transport seam and an in-memory loopback broker.

use std::collections::{BTreeMap, VecDeque};
use std::io;

use console_proto::{PublishOptions, TopicFilter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker connection is down")]
    Disconnected,
    #[error("broker i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode broker frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publish/subscribe primitives. Every call is fire-and-forget.
pub trait BrokerTransport {
    fn subscribe(&mut self, filter: &TopicFilter) -> Result<(), TransportError>;
    fn unsubscribe(&mut self, filter: &TopicFilter) -> Result<(), TransportError>;
    fn unsubscribe_all(&mut self) -> Result<(), TransportError>;
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        options: PublishOptions,
    ) -> Result<(), TransportError>;
    /// Messages received since the last call, in arrival order.
    fn drain_inbound(&mut self) -> Vec<InboundMessage>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub options: PublishOptions,
}

/// Single-client broker that keeps retained messages in memory.
///
/// Subscribing delivers every retained message the filter matches, and
/// publishing loops back to the client when one of its filters matches, so
/// a console wired to it sees the same cascade a real broker would produce.
#[derive(Debug, Default)]
pub struct LoopbackBroker {
    retained: BTreeMap<String, Vec<u8>>,
    subscriptions: Vec<TopicFilter>,
    inbox: VecDeque<InboundMessage>,
    published: Vec<PublishedMessage>,
    subscribe_log: Vec<TopicFilter>,
    unsubscribe_all_calls: usize,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish from another client: retain it and deliver if subscribed.
    pub fn inject(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>, retain: bool) {
        let topic = topic.into();
        let payload = payload.into();
        if retain {
            self.retain(&topic, &payload);
        }
        self.deliver(&topic, &payload);
    }

    /// Seed retained state without delivering it.
    pub fn seed_retained(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        let topic = topic.into();
        let payload = payload.into();
        self.retain(&topic, &payload);
    }

    pub fn retained(&self, topic: &str) -> Option<&[u8]> {
        self.retained.get(topic).map(Vec::as_slice)
    }

    pub fn subscriptions(&self) -> &[TopicFilter] {
        &self.subscriptions
    }

    pub fn subscribe_log(&self) -> &[TopicFilter] {
        &self.subscribe_log
    }

    pub fn is_subscribed(&self, filter: &str) -> bool {
        self.subscriptions.iter().any(|f| f.as_str() == filter)
    }

    pub fn published(&self) -> &[PublishedMessage] {
        &self.published
    }

    pub fn take_published(&mut self) -> Vec<PublishedMessage> {
        std::mem::take(&mut self.published)
    }

    pub fn unsubscribe_all_calls(&self) -> usize {
        self.unsubscribe_all_calls
    }

    fn retain(&mut self, topic: &str, payload: &[u8]) {
        if payload.is_empty() {
            self.retained.remove(topic);
        } else {
            self.retained.insert(topic.to_string(), payload.to_vec());
        }
    }

    fn deliver(&mut self, topic: &str, payload: &[u8]) {
        if self.subscriptions.iter().any(|filter| filter.matches(topic)) {
            self.inbox.push_back(InboundMessage::new(topic, payload));
        }
    }
}

impl BrokerTransport for LoopbackBroker {
    fn subscribe(&mut self, filter: &TopicFilter) -> Result<(), TransportError> {
        self.subscribe_log.push(filter.clone());
        if !self.subscriptions.contains(filter) {
            self.subscriptions.push(filter.clone());
        }
        let matching: Vec<InboundMessage> = self
            .retained
            .iter()
            .filter(|(topic, _)| filter.matches(topic))
            .map(|(topic, payload)| InboundMessage::new(topic.clone(), payload.clone()))
            .collect();
        self.inbox.extend(matching);
        Ok(())
    }

    fn unsubscribe(&mut self, filter: &TopicFilter) -> Result<(), TransportError> {
        self.subscriptions.retain(|existing| existing != filter);
        Ok(())
    }

    fn unsubscribe_all(&mut self) -> Result<(), TransportError> {
        self.unsubscribe_all_calls += 1;
        self.subscriptions.clear();
        self.inbox.clear();
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        options: PublishOptions,
    ) -> Result<(), TransportError> {
        self.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            options,
        });
        if options.retain {
            self.retain(topic, payload);
        }
        self.deliver(topic, payload);
        Ok(())
    }

    fn drain_inbound(&mut self) -> Vec<InboundMessage> {
        self.inbox.drain(..).collect()
    }
}
