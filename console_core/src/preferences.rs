//! Per-layer visibility and opacity, persisted across sessions.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use console_proto::LayerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{BrokerConfig, LayerConfig};
use crate::render::OpacityLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerPreference {
    pub opacity: OpacityLevel,
    pub is_visible: bool,
}

impl Default for LayerPreference {
    fn default() -> Self {
        Self {
            opacity: OpacityLevel::HIGH,
            is_visible: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("preference store is unavailable")]
    Unavailable,
    #[error("failed to read preferences from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write preferences to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode preferences: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Key/value store behind the cache. Keys are dotted layer keys.
pub trait PreferenceStore: Send {
    fn get(&self, key: &str) -> Result<Option<LayerPreference>, PreferenceError>;
    fn put(&mut self, key: &str, value: LayerPreference) -> Result<(), PreferenceError>;
    fn broker(&self) -> Result<Option<BrokerConfig>, PreferenceError>;
    fn put_broker(&mut self, broker: &BrokerConfig) -> Result<(), PreferenceError>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct PreferenceDocument {
    layers: BTreeMap<String, LayerPreference>,
    broker: Option<BrokerConfig>,
}

#[derive(Debug, Default)]
pub struct MemoryPreferences {
    document: PreferenceDocument,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Result<Option<LayerPreference>, PreferenceError> {
        Ok(self.document.layers.get(key).copied())
    }

    fn put(&mut self, key: &str, value: LayerPreference) -> Result<(), PreferenceError> {
        self.document.layers.insert(key.to_string(), value);
        Ok(())
    }

    fn broker(&self) -> Result<Option<BrokerConfig>, PreferenceError> {
        Ok(self.document.broker.clone())
    }

    fn put_broker(&mut self, broker: &BrokerConfig) -> Result<(), PreferenceError> {
        self.document.broker = Some(broker.clone());
        Ok(())
    }
}

/// JSON document on disk, rewritten on every change.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    document: PreferenceDocument,
}

impl FilePreferences {
    /// Open `path`; a missing file starts an empty document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PreferenceError> {
        let path = path.into();
        let document = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => PreferenceDocument::default(),
            Err(source) => return Err(PreferenceError::Read { path, source }),
        };
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), PreferenceError> {
        let write_err = |source: io::Error| PreferenceError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let contents = serde_json::to_string_pretty(&self.document)?;
        fs::write(&self.path, contents).map_err(write_err)
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Result<Option<LayerPreference>, PreferenceError> {
        Ok(self.document.layers.get(key).copied())
    }

    fn put(&mut self, key: &str, value: LayerPreference) -> Result<(), PreferenceError> {
        self.document.layers.insert(key.to_string(), value);
        self.persist()
    }

    fn broker(&self) -> Result<Option<BrokerConfig>, PreferenceError> {
        Ok(self.document.broker.clone())
    }

    fn put_broker(&mut self, broker: &BrokerConfig) -> Result<(), PreferenceError> {
        self.document.broker = Some(broker.clone());
        self.persist()
    }
}

/// Read-through, write-through cache that never fails its callers: when the
/// store errors, defaults and in-memory values are used instead.
pub struct PreferenceCache {
    store: Box<dyn PreferenceStore>,
    cached: HashMap<LayerId, LayerPreference>,
    defaults: LayerPreference,
}

impl PreferenceCache {
    pub fn new(store: Box<dyn PreferenceStore>, layers: &LayerConfig) -> Self {
        Self {
            store,
            cached: HashMap::new(),
            defaults: LayerPreference {
                opacity: OpacityLevel::new(layers.default_opacity),
                is_visible: layers.default_visible,
            },
        }
    }

    pub fn in_memory(layers: &LayerConfig) -> Self {
        Self::new(Box::new(MemoryPreferences::new()), layers)
    }

    pub fn get(&mut self, layer: &LayerId) -> LayerPreference {
        if let Some(pref) = self.cached.get(layer) {
            return *pref;
        }
        let key = layer.preference_key();
        let pref = match self.store.get(&key) {
            Ok(Some(pref)) => pref,
            Ok(None) => self.defaults,
            Err(err) => {
                warn!(
                    target: "sensor_console::preferences",
                    key = %key,
                    error = %err,
                    "preferences.read_failed=defaults"
                );
                self.defaults
            }
        };
        self.cached.insert(layer.clone(), pref);
        pref
    }

    pub fn set_opacity(&mut self, layer: &LayerId, opacity: OpacityLevel) -> LayerPreference {
        let mut pref = self.get(layer);
        pref.opacity = opacity;
        self.write(layer, pref);
        pref
    }

    pub fn set_visible(&mut self, layer: &LayerId, is_visible: bool) -> LayerPreference {
        let mut pref = self.get(layer);
        pref.is_visible = is_visible;
        self.write(layer, pref);
        pref
    }

    /// Write every cached entry back to the store.
    pub fn flush(&mut self) {
        let entries: Vec<(LayerId, LayerPreference)> =
            self.cached.iter().map(|(k, v)| (k.clone(), *v)).collect();
        for (layer, pref) in entries {
            self.write(&layer, pref);
        }
    }

    pub fn broker(&self) -> Option<BrokerConfig> {
        match self.store.broker() {
            Ok(broker) => broker,
            Err(err) => {
                warn!(
                    target: "sensor_console::preferences",
                    error = %err,
                    "preferences.broker_read_failed"
                );
                None
            }
        }
    }

    pub fn put_broker(&mut self, broker: &BrokerConfig) {
        if let Err(err) = self.store.put_broker(broker) {
            warn!(
                target: "sensor_console::preferences",
                error = %err,
                "preferences.broker_write_failed"
            );
        }
    }

    fn write(&mut self, layer: &LayerId, pref: LayerPreference) {
        self.cached.insert(layer.clone(), pref);
        let key = layer.preference_key();
        match self.store.put(&key, pref) {
            Ok(()) => debug!(
                target: "sensor_console::preferences",
                key = %key,
                opacity = pref.opacity.level(),
                visible = pref.is_visible,
                "preferences.stored"
            ),
            Err(err) => warn!(
                target: "sensor_console::preferences",
                key = %key,
                error = %err,
                "preferences.write_failed=memory_only"
            ),
        }
    }
}
