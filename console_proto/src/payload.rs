//! JSON payload shapes carried on the configuration topics.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::{ChainId, StreamKey, SubSystemId};

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is empty")]
    Empty,
    #[error("payload is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("failed to decode JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a JSON payload, treating an empty body as [`PayloadError::Empty`].
pub fn decode_json<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, PayloadError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(PayloadError::Empty);
    }
    Ok(serde_json::from_slice(payload)?)
}

pub fn decode_text(payload: &[u8]) -> Result<&str, PayloadError> {
    Ok(std::str::from_utf8(payload)?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedChain {
    pub id: ChainId,
    #[serde(default)]
    pub is_running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoOrigin {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng")]
    pub longitude: f64,
}

impl GeoOrigin {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Payload of `Chains/{id}/Setup`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSetup {
    pub label: String,
    pub origin: GeoOrigin,
    /// Sensor coverage radius in metres.
    pub range: f64,
}

/// Payload of `AvailableSubSystems/{id}/Definition`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Definition {
    pub label: String,
    pub streams: Vec<StreamKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointProtocol {
    Mqtt,
    Mqtts,
    Tcp,
    Udp,
    Other,
}

impl EndpointProtocol {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "MQTT" => Self::Mqtt,
            "MQTTS" => Self::Mqtts,
            "TCP" => Self::Tcp,
            "UDP" => Self::Udp,
            _ => Self::Other,
        }
    }

    pub fn is_broker(self) -> bool {
        matches!(self, Self::Mqtt | Self::Mqtts)
    }

    /// Protocols a downstream subsystem can ingest from.
    pub fn accepts_incoming(self) -> bool {
        matches!(self, Self::Mqtt | Self::Mqtts | Self::Tcp)
    }
}

/// Outgoing or incoming data endpoint of a subsystem.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Endpoint {
    pub protocol: String,
    pub ip: String,
    #[serde(deserialize_with = "lenient_port")]
    pub port: u16,
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SubSystemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<Value>,
}

impl Endpoint {
    pub fn protocol_kind(&self) -> EndpointProtocol {
        EndpointProtocol::parse(&self.protocol)
    }

    pub fn is_unset(&self) -> bool {
        self.protocol.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckItem {
    pub label: String,
    pub is_checked: bool,
}

/// Dynamic subsystem control published on `.../Controls/{controlId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Control {
    TextBox {
        #[serde(default)]
        label: String,
        #[serde(default, deserialize_with = "lenient_string")]
        value: String,
    },
    Radio {
        #[serde(default)]
        label: String,
        #[serde(default)]
        items: Vec<String>,
        #[serde(default, deserialize_with = "lenient_index")]
        selected: usize,
    },
    CheckBox {
        #[serde(default)]
        label: String,
        #[serde(default)]
        items: Vec<CheckItem>,
    },
    Slider {
        #[serde(default)]
        label: String,
        #[serde(default, deserialize_with = "lenient_f64")]
        min: f64,
        #[serde(default, deserialize_with = "lenient_f64")]
        max: f64,
        #[serde(default, deserialize_with = "lenient_f64")]
        value: f64,
    },
}

/// A typed edit an operator applies to a [`Control`].
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEdit {
    Text(String),
    Select(usize),
    Check { index: usize, checked: bool },
    Slide(f64),
}

impl Control {
    pub fn label(&self) -> &str {
        match self {
            Control::TextBox { label, .. }
            | Control::Radio { label, .. }
            | Control::CheckBox { label, .. }
            | Control::Slider { label, .. } => label,
        }
    }

    /// Apply `edit`; returns `false` when the edit does not fit this control.
    pub fn apply(&mut self, edit: &ControlEdit) -> bool {
        match (self, edit) {
            (Control::TextBox { value, .. }, ControlEdit::Text(text)) => {
                *value = text.clone();
                true
            }
            (Control::Radio { items, selected, .. }, ControlEdit::Select(index))
                if *index < items.len() =>
            {
                *selected = *index;
                true
            }
            (Control::CheckBox { items, .. }, ControlEdit::Check { index, checked }) => {
                match items.get_mut(*index) {
                    Some(item) => {
                        item.is_checked = *checked;
                        true
                    }
                    None => false,
                }
            }
            (Control::Slider { min, max, value, .. }, ControlEdit::Slide(target)) => {
                if !target.is_finite() {
                    return false;
                }
                let (low, high) = if *min <= *max { (*min, *max) } else { (*max, *min) };
                *value = target.clamp(low, high);
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayType {
    HeatMap,
    Plot,
    Strobe,
    Track,
}

impl fmt::Display for DisplayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisplayType::HeatMap => "HeatMap",
            DisplayType::Plot => "Plot",
            DisplayType::Strobe => "Strobe",
            DisplayType::Track => "Track",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Classification {
    pub palette_index: usize,
    pub symbol_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Schema declaration for one data stream, `.../Data/{stream}/Interpretation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpretation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub header: String,
    pub display: DisplayType,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    pub refresh_period: String,
    /// Approximate resolution cell diameter in metres (heat maps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dot_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_types: Option<Value>,
}

/// Payload of `.../Rates`; `total` is the per-bar activity histogram.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct RateReport {
    #[serde(deserialize_with = "lenient_rate_mask")]
    pub total: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SubSystemState {
    #[default]
    Unknown,
    Operational,
    Caution,
    Failure,
}

impl SubSystemState {
    /// Map a raw `Status` payload. Anything unrecognised is `Unknown`.
    pub fn from_status(raw: &str) -> Self {
        match raw.trim().trim_matches('"') {
            "Operational" => Self::Operational,
            "Caution" => Self::Caution,
            "Failure" => Self::Failure,
            _ => Self::Unknown,
        }
    }

    /// Aggregate state of a chain from its subsystems' states.
    pub fn rollup<I: IntoIterator<Item = SubSystemState>>(states: I) -> Self {
        let mut any = false;
        let mut all_operational = true;
        let mut all_unknown = true;
        for state in states {
            any = true;
            match state {
                Self::Failure => return Self::Failure,
                Self::Operational => all_unknown = false,
                Self::Unknown => all_operational = false,
                Self::Caution => {
                    all_unknown = false;
                    all_operational = false;
                }
            }
        }
        match (any, all_operational, all_unknown) {
            (false, _, _) | (_, _, true) => Self::Unknown,
            (_, true, _) => Self::Operational,
            _ => Self::Caution,
        }
    }
}

impl fmt::Display for SubSystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Operational => "Operational",
            Self::Caution => "Caution",
            Self::Failure => "Failure",
        };
        f.write_str(name)
    }
}

fn lenient_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| de::Error::custom(format!("port out of range: {n}"))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid port {s:?}"))),
        Value::Null => Ok(0),
        other => Err(de::Error::custom(format!("invalid port {other}"))),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom("number out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid number {s:?}"))),
        Value::Null => Ok(0.0),
        other => Err(de::Error::custom(format!("invalid number {other}"))),
    }
}

fn lenient_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let raw = lenient_f64(deserializer)?;
    if raw < 0.0 || raw.fract() != 0.0 {
        return Err(de::Error::custom(format!("invalid index {raw}")));
    }
    Ok(raw as usize)
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct StringVisitor;

    impl<'de> Visitor<'de> for StringVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(StringVisitor)
}

fn lenient_rate_mask<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Array(bars) => Ok(bars
            .iter()
            .map(|bar| {
                let level = bar.as_f64().unwrap_or(0.0).clamp(0.0, 9.0) as u32;
                char::from_digit(level, 10).unwrap_or('0')
            })
            .collect()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("invalid rate mask {other}"))),
    }
}
