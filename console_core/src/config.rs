//! Configuration for the console engine.
//!
//! Loaded from `console_config.json` with support for an environment variable override.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BUILTIN_CONSOLE_CONFIG: &str = include_str!("data/console_config.json");

pub const CONSOLE_CONFIG_ENV: &str = "CONSOLE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub broker: BrokerConfig,
    pub timing: TimingConfig,
    pub layers: LayerConfig,
    pub tiles: TileConfig,
    pub preferences: PreferencesConfig,
}

impl ConsoleConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_CONSOLE_CONFIG)
                .expect("builtin console config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConsoleConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConsoleConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = ConsoleConfig::from_json_str(&contents)?;
        Ok(config)
    }
}

/// Where the broker lives; persisted alongside layer preferences.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            protocol: "ws".to_string(),
            host: "localhost".to_string(),
            port: 9001,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Poll cadence of every store's refresh, and of keyed-entity pruning.
    pub refresh_interval_ms: u64,
    pub status_refresh_interval_ms: u64,
    /// A subsystem silent for longer than this reverts to `Unknown`.
    pub status_timeout_ms: u64,
    pub reload_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1_000,
            status_refresh_interval_ms: 2_000,
            status_timeout_ms: 3_000,
            reload_delay_ms: 1_500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Generations kept by a heat map, counting the active one.
    pub heat_map_scan_history: usize,
    /// Generations kept by a plot layer, counting the active one.
    pub plot_scan_history: usize,
    pub entity_timeout_factor: u32,
    pub track_trail_limit: usize,
    pub default_opacity: u8,
    pub default_visible: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            heat_map_scan_history: 2,
            plot_scan_history: 6,
            entity_timeout_factor: 4,
            track_trail_limit: 512,
            default_opacity: 2,
            default_visible: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TileServer {
    #[default]
    Default,
    Azure,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TileConfig {
    pub day_mode: bool,
    pub server: TileServer,
    pub default_day_url: String,
    pub default_night_url: String,
    pub default_max_zoom: u8,
    pub azure_url: String,
    pub azure_day_tileset: String,
    pub azure_night_tileset: String,
    pub azure_max_zoom: u8,
    pub azure_subscription_key: String,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            day_mode: true,
            server: TileServer::Default,
            default_day_url:
                "https://tiles.stadiamaps.com/tiles/alidade_smooth/{z}/{x}/{y}{r}.png".to_string(),
            default_night_url:
                "https://tiles.stadiamaps.com/tiles/alidade_smooth_dark/{z}/{x}/{y}{r}.png"
                    .to_string(),
            default_max_zoom: 20,
            azure_url: concat!(
                "https://atlas.microsoft.com/map/tile?subscription-key={subscriptionKey}",
                "&api-version=2.0&tilesetId={tilesetId}&tileSize=512&zoom={z}&x={x}&y={y}",
            )
            .to_string(),
            azure_day_tileset: "microsoft.base.road".to_string(),
            azure_night_tileset: "microsoft.base.darkgrey".to_string(),
            azure_max_zoom: 18,
            azure_subscription_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Preference file; `None` means the per-user config directory.
    pub path: Option<PathBuf>,
}

impl PreferencesConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            dirs::config_dir().map(|dir| dir.join("sensor_console").join("preferences.json"))
        })
    }
}

#[derive(Debug, Error)]
pub enum ConsoleConfigError {
    #[error("failed to parse console config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read console config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Load from an explicit path, falling back to the builtin copy on failure.
pub fn load_console_config(path: Option<&Path>) -> Arc<ConsoleConfig> {
    if let Some(path) = path {
        match ConsoleConfig::from_file(path) {
            Ok(config) => {
                tracing::info!(
                    target: "sensor_console::config",
                    path = %path.display(),
                    "console_config.loaded=file"
                );
                return Arc::new(config);
            }
            Err(err) => {
                tracing::warn!(
                    target: "sensor_console::config",
                    path = %path.display(),
                    error = %err,
                    "console_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "sensor_console::config", "console_config.loaded=builtin");
    ConsoleConfig::builtin()
}

/// Load using `CONSOLE_CONFIG_PATH` when set.
pub fn load_console_config_from_env() -> Arc<ConsoleConfig> {
    let override_path = env::var(CONSOLE_CONFIG_ENV).ok().map(PathBuf::from);
    load_console_config(override_path.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_defaults() {
        let builtin = ConsoleConfig::builtin();
        let defaults = ConsoleConfig::default();
        assert_eq!(builtin.broker, defaults.broker);
        assert_eq!(builtin.timing.refresh_interval_ms, 1_000);
        assert_eq!(builtin.timing.reload_delay_ms, defaults.timing.reload_delay_ms);
        assert_eq!(builtin.layers.heat_map_scan_history, 2);
        assert_eq!(builtin.layers.plot_scan_history, 6);
        assert_eq!(builtin.tiles.azure_night_tileset, "microsoft.base.darkgrey");
        assert!(builtin.tiles.azure_subscription_key.is_empty());
    }

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let config =
            ConsoleConfig::from_json_str(r#"{"timing":{"status_timeout_ms":5000}}"#).unwrap();
        assert_eq!(config.timing.status_timeout_ms, 5_000);
        assert_eq!(config.timing.status_refresh_interval_ms, 2_000);
        assert_eq!(config.layers.entity_timeout_factor, 4);
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let config = load_console_config(Some(Path::new("/nonexistent/console.json")));
        assert_eq!(config.broker.port, 9001);
    }

    #[test]
    fn read_errors_carry_the_path() {
        let err = ConsoleConfig::from_file(Path::new("/nonexistent/console.json")).unwrap_err();
        assert!(matches!(err, ConsoleConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/console.json"));
    }
}
