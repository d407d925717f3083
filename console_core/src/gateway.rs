//! Outbound side: serializes the local model back onto the bus.
//!
//! A save republishes the whole authoritative configuration. Topics queued
//! for clearing are emptied first so no stale retained message survives the
//! new state.

use console_proto::{
    ChainId, Endpoint, PublishOptions, SelectedChain, SubSystemId, SubSystemPath, Topic,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::broker::{BrokerTransport, TransportError};
use crate::model::{BoundSubSystem, ModelStore};

/// One retained publish produced by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn clear(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: Vec::new(),
        }
    }

    pub fn json<T: Serialize + ?Sized>(
        topic: &Topic,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic: topic.to_string(),
            payload: serde_json::to_vec(value)?,
        })
    }

    pub fn is_clear(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Endpoint a subsystem announces on its `Outgoing` topic; `None` is `{}`.
fn outgoing_endpoint(sub: &BoundSubSystem) -> Option<Endpoint> {
    let endpoint = &sub.endpoint;
    if endpoint.is_unset() {
        return None;
    }
    let topics = if endpoint.protocol_kind().is_broker() {
        endpoint.topics.clone()
    } else {
        selected_topic(endpoint).into_iter().collect()
    };
    Some(Endpoint {
        protocol: endpoint.protocol.clone(),
        ip: endpoint.ip.clone(),
        port: endpoint.port,
        topics,
        ..Endpoint::default()
    })
}

fn selected_topic(endpoint: &Endpoint) -> Option<String> {
    endpoint
        .selected_topic
        .clone()
        .or_else(|| endpoint.topics.first().cloned())
}

/// Incoming endpoint of a subsystem fed by `previous`.
fn incoming_endpoint(previous: Option<&BoundSubSystem>) -> Option<Endpoint> {
    let previous = previous?;
    let endpoint = &previous.endpoint;
    if endpoint.is_unset() {
        return None;
    }
    let stream = selected_topic(endpoint);
    let layout = stream
        .as_ref()
        .and_then(|stream| previous.data_streams.get(stream))
        .and_then(|data| data.layout.clone());
    Some(Endpoint {
        protocol: endpoint.protocol.clone(),
        ip: endpoint.ip.clone(),
        port: endpoint.port,
        topics: stream.into_iter().collect(),
        selected_topic: None,
        source: Some(previous.id.clone()),
        layout,
    })
}

fn endpoint_message(
    topic: &Topic,
    endpoint: Option<Endpoint>,
) -> Result<OutboundMessage, serde_json::Error> {
    match endpoint {
        Some(endpoint) => OutboundMessage::json(topic, &endpoint),
        None => OutboundMessage::json(topic, &serde_json::Map::new()),
    }
}

/// Every publish a save performs, in order.
pub fn settings_plan(model: &ModelStore) -> Result<Vec<OutboundMessage>, serde_json::Error> {
    let mut plan = Vec::new();

    for topic in model.purged_topics() {
        plan.push(OutboundMessage::clear(topic.clone()));
    }
    for chain in model.purged_chains() {
        plan.push(OutboundMessage::clear(
            Topic::ChainSetup(chain.clone()).to_string(),
        ));
        plan.push(OutboundMessage::clear(
            Topic::ChainSubSystems(chain.clone()).to_string(),
        ));
    }

    for chain in model.chains() {
        let bound = model.bound(&chain.id);
        for sub in bound {
            let path = SubSystemPath::new(chain.id.clone(), sub.id.clone());
            plan.push(endpoint_message(&Topic::Outgoing(path), outgoing_endpoint(sub))?);
        }
        for (index, sub) in bound.iter().enumerate() {
            let previous = index.checked_sub(1).and_then(|i| bound.get(i));
            let path = SubSystemPath::new(chain.id.clone(), sub.id.clone());
            plan.push(endpoint_message(&Topic::Incoming(path), incoming_endpoint(previous))?);
        }
        let order: Vec<&SubSystemId> = bound.iter().map(|sub| &sub.id).collect();
        plan.push(OutboundMessage::json(
            &Topic::ChainSubSystems(chain.id.clone()),
            &order,
        )?);
    }

    let chains: Vec<&ChainId> = model.available_chains().iter().collect();
    plan.push(OutboundMessage::json(&Topic::AvailableChains, &chains)?);

    for chain in model.chains() {
        plan.push(OutboundMessage::json(
            &Topic::ChainSetup(chain.id.clone()),
            &chain.setup(),
        )?);
    }

    if let Some(selected) = model.selected() {
        let message = SelectedChain {
            id: selected.clone(),
            is_running: false,
        };
        plan.push(OutboundMessage::json(&Topic::SelectedChain, &message)?);
    }

    Ok(plan)
}

/// Publish `plan` with retained, at-least-once delivery.
pub fn publish_plan<B: BrokerTransport + ?Sized>(
    broker: &mut B,
    plan: &[OutboundMessage],
) -> Result<usize, TransportError> {
    let options = PublishOptions::default();
    for message in plan {
        debug!(
            target: "sensor_console::gateway",
            topic = %message.topic,
            bytes = message.payload.len(),
            "gateway.publish"
        );
        broker.publish(&message.topic, &message.payload, options)?;
    }
    let cleared = plan.iter().filter(|message| message.is_clear()).count();
    info!(
        target: "sensor_console::gateway",
        published = plan.len(),
        cleared,
        "gateway.saved"
    );
    Ok(plan.len())
}
