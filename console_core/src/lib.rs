//! Sensor console engine.
//!
//! Reconciles the retained configuration a processing-chain broker carries
//! into a typed model, decodes per-stream record schemas announced at
//! runtime, and drives one lifecycle store per data layer. Rendering, the
//! broker connection and preference storage are reached through traits so
//! front-ends can supply their own; in-memory versions ship for tests.

pub mod bridge;
pub mod broker;
pub mod config;
mod console;
pub mod gateway;
pub mod geo;
pub mod layers;
pub mod model;
pub mod preferences;
pub mod render;
pub mod scheduler;
pub mod schema;
pub mod stores;

pub use bridge::{
    decode_frame, encode_frame, frame_len, BridgeFrame, BridgeLink, ChannelBroker, FrameError,
    MAX_FRAME_LEN,
};
pub use broker::{BrokerTransport, InboundMessage, LoopbackBroker, PublishedMessage, TransportError};
pub use config::{
    load_console_config, load_console_config_from_env, BrokerConfig, ConsoleConfig,
    ConsoleConfigError, LayerConfig, TileConfig, TileServer, TimingConfig,
};
pub use console::{Console, ConsoleError, Phase};
pub use gateway::{publish_plan, settings_plan, OutboundMessage};
pub use geo::LatLng;
pub use layers::{LayerRegistry, LayerSummary, PollTask};
pub use model::{
    AvailableSubSystem, BoundSubSystem, ChainRecord, DataStream, LayerKind, LayerRecord,
    ModelStore, RecordRoute,
};
pub use preferences::{
    FilePreferences, LayerPreference, MemoryPreferences, PreferenceCache, PreferenceError,
    PreferenceStore,
};
pub use render::{Entity, HeadlessSurface, OpacityLevel, Pane, PaneId, RenderSurface, Shape};
pub use scheduler::{Clock, ManualClock, PollHandle, PollScheduler, SystemClock};
pub use schema::{Field, GeoMode, RecordError, RecordSchema};

/// Open the configured preference file, or fall back to memory when it
/// cannot be read.
pub fn open_preferences(config: &ConsoleConfig) -> PreferenceCache {
    let Some(path) = config.preferences.resolved_path() else {
        return PreferenceCache::in_memory(&config.layers);
    };
    match FilePreferences::open(&path) {
        Ok(store) => PreferenceCache::new(Box::new(store), &config.layers),
        Err(err) => {
            tracing::warn!(
                target: "sensor_console::preferences",
                path = %path.display(),
                error = %err,
                "preferences.open_failed=memory"
            );
            PreferenceCache::in_memory(&config.layers)
        }
    }
}
