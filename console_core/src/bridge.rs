//! Broker bridge wire format and a channel-backed transport.
//!
//! A bridge relays broker traffic over TCP as frames of a u32 little-endian
//! length followed by one JSON object. The network side runs on its own
//! task and talks to the console through [`ChannelBroker`].

use console_proto::{PublishOptions, TopicFilter};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broker::{BrokerTransport, InboundMessage, TransportError};

/// Frames larger than this are treated as a corrupt stream.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeFrame {
    Message {
        topic: String,
        payload: String,
    },
    Subscribe {
        filter: String,
    },
    Unsubscribe {
        filter: String,
    },
    UnsubscribeAll,
    Publish {
        topic: String,
        payload: String,
        qos: u8,
        retain: bool,
    },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds the bridge limit")]
    TooLarge(usize),
    #[error("malformed bridge frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Length-prefix and serialize one frame.
pub fn encode_frame(frame: &BridgeFrame) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(frame)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(body.len()));
    }
    let mut buffer = Vec::with_capacity(4 + body.len());
    buffer.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buffer.extend_from_slice(&body);
    Ok(buffer)
}

/// Body length announced by a 4-byte frame header.
pub fn frame_len(header: [u8; 4]) -> Result<usize, FrameError> {
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    Ok(len)
}

pub fn decode_frame(body: &[u8]) -> Result<BridgeFrame, FrameError> {
    Ok(serde_json::from_slice(body)?)
}

/// Network-side ends of a [`ChannelBroker`].
#[derive(Debug, Clone)]
pub struct BridgeLink {
    pub inbound: Sender<InboundMessage>,
    pub outbound: Receiver<BridgeFrame>,
}

impl BridgeLink {
    /// Forward a received frame to the console. Only `message` frames
    /// travel in this direction; anything else is ignored.
    pub fn deliver(&self, frame: BridgeFrame) -> bool {
        match frame {
            BridgeFrame::Message { topic, payload } => self
                .inbound
                .send(InboundMessage::new(topic, payload.into_bytes()))
                .is_ok(),
            _ => false,
        }
    }
}

/// Transport whose traffic is carried by channels to a bridge task.
#[derive(Debug)]
pub struct ChannelBroker {
    outbound: Sender<BridgeFrame>,
    inbound: Receiver<InboundMessage>,
}

impl ChannelBroker {
    pub fn pair() -> (Self, BridgeLink) {
        let (inbound_tx, inbound_rx) = unbounded();
        let (outbound_tx, outbound_rx) = unbounded();
        (
            Self {
                outbound: outbound_tx,
                inbound: inbound_rx,
            },
            BridgeLink {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
        )
    }

    fn send(&self, frame: BridgeFrame) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Disconnected)
    }
}

impl BrokerTransport for ChannelBroker {
    fn subscribe(&mut self, filter: &TopicFilter) -> Result<(), TransportError> {
        self.send(BridgeFrame::Subscribe {
            filter: filter.to_string(),
        })
    }

    fn unsubscribe(&mut self, filter: &TopicFilter) -> Result<(), TransportError> {
        self.send(BridgeFrame::Unsubscribe {
            filter: filter.to_string(),
        })
    }

    fn unsubscribe_all(&mut self) -> Result<(), TransportError> {
        self.send(BridgeFrame::UnsubscribeAll)
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        options: PublishOptions,
    ) -> Result<(), TransportError> {
        self.send(BridgeFrame::Publish {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            qos: options.qos,
            retain: options.retain,
        })
    }

    fn drain_inbound(&mut self) -> Vec<InboundMessage> {
        self.inbound.try_iter().collect()
    }
}
