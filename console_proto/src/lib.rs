//! Wire vocabulary shared by the sensor console engine and its front-ends.
//!
//! Everything that has to be bit-exact for interop with the processing
//! chains lives here: identifiers, the topic grammar, the JSON payloads that
//! travel on those topics and the ISO-8601 durations embedded in them.

mod duration;
mod ids;
mod palette;
mod payload;
mod topic;

pub use duration::{iso8601_duration, iso8601_millis, DurationError};
pub use ids::{ChainId, ControlId, IdError, LayerId, StreamKey, StreamLayerId, SubSystemId};
pub use palette::{palette_colour, HeatGradient, CONSOLE_PALETTE, EMPTY_RATE_MASK};
pub use payload::{
    decode_json, decode_text, ChainSetup, CheckItem, Classification, Control, ControlEdit,
    Definition, DisplayType, Endpoint, EndpointProtocol, GeoOrigin, Interpretation, PayloadError,
    RateReport, SelectedChain, SubSystemState,
};
pub use topic::{SubSystemPath, Topic, TopicError, TopicFilter};

/// Options every console publish uses: at-least-once, retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: u8,
    pub retain: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            qos: 1,
            retain: true,
        }
    }
}
