//! Base map tile layer.

use console_proto::LayerId;
use tracing::warn;

use super::{apply_opacity, apply_visibility, create_panes};
use crate::config::{TileConfig, TileServer};
use crate::preferences::LayerPreference;
use crate::render::{Entity, OpacityLevel, Pane, PaneId, RenderSurface, Shape};

#[derive(Debug)]
pub struct TileOverlay {
    config: TileConfig,
    pane: PaneId,
    day_mode: bool,
    server: TileServer,
    visible: bool,
}

impl TileOverlay {
    pub fn new(
        config: &TileConfig,
        surface: &mut dyn RenderSurface,
        preference: LayerPreference,
    ) -> Self {
        let pane = PaneId::new(LayerId::WorldMap, Pane::Tiles);
        create_panes(
            surface,
            std::slice::from_ref(&pane),
            preference.opacity.visual(),
            preference.is_visible,
        );
        let mut overlay = Self {
            config: config.clone(),
            pane,
            day_mode: config.day_mode,
            server: config.server,
            visible: preference.is_visible,
        };
        overlay.draw(surface);
        overlay
    }

    pub fn layer(&self) -> &LayerId {
        &self.pane.layer
    }

    pub fn day_mode(&self) -> bool {
        self.day_mode
    }

    pub fn server(&self) -> TileServer {
        self.server
    }

    /// Tile URL template for the current server and mode.
    pub fn url(&self) -> String {
        match self.server {
            TileServer::Default if self.day_mode => self.config.default_day_url.clone(),
            TileServer::Default => self.config.default_night_url.clone(),
            TileServer::Azure => {
                let tileset = if self.day_mode {
                    &self.config.azure_day_tileset
                } else {
                    &self.config.azure_night_tileset
                };
                self.config
                    .azure_url
                    .replace("{subscriptionKey}", &self.config.azure_subscription_key)
                    .replace("{tilesetId}", tileset)
            }
        }
    }

    pub fn max_zoom(&self) -> u8 {
        match self.server {
            TileServer::Default => self.config.default_max_zoom,
            TileServer::Azure => self.config.azure_max_zoom,
        }
    }

    pub fn set_day_mode(&mut self, surface: &mut dyn RenderSurface, day_mode: bool) {
        if self.day_mode != day_mode {
            self.day_mode = day_mode;
            self.draw(surface);
        }
    }

    pub fn set_server(&mut self, surface: &mut dyn RenderSurface, server: TileServer) {
        if self.server != server {
            self.server = server;
            self.draw(surface);
        }
    }

    pub fn set_opacity(&mut self, surface: &mut dyn RenderSurface, level: OpacityLevel) {
        apply_opacity(surface, std::slice::from_ref(&self.pane), level.visual());
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, surface: &mut dyn RenderSurface, visible: bool) {
        self.visible = visible;
        apply_visibility(surface, std::slice::from_ref(&self.pane), visible);
    }

    pub fn dispose(&mut self, surface: &mut dyn RenderSurface) {
        surface.remove_layer(&self.pane);
    }

    fn draw(&mut self, surface: &mut dyn RenderSurface) {
        if self.server == TileServer::Azure && self.config.azure_subscription_key.is_empty() {
            warn!(
                target: "sensor_console::layers",
                "tiles.azure_key=missing"
            );
        }
        let tiles = Shape::Tiles {
            url: self.url(),
            max_zoom: self.max_zoom(),
        };
        surface.set_entities(&self.pane, vec![Entity::new("base", tiles)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessSurface;

    fn drawn(surface: &HeadlessSurface, overlay: &TileOverlay) -> (String, u8) {
        match &surface.entities(&overlay.pane)[0].shape {
            Shape::Tiles { url, max_zoom } => (url.clone(), *max_zoom),
            other => panic!("expected tiles, got {other:?}"),
        }
    }

    #[test]
    fn default_server_switches_with_day_mode() {
        let mut surface = HeadlessSurface::new();
        let mut tiles =
            TileOverlay::new(&TileConfig::default(), &mut surface, LayerPreference::default());
        let (url, zoom) = drawn(&surface, &tiles);
        assert!(url.contains("alidade_smooth/"));
        assert_eq!(zoom, 20);

        tiles.set_day_mode(&mut surface, false);
        assert!(drawn(&surface, &tiles).0.contains("alidade_smooth_dark"));
    }

    #[test]
    fn azure_substitutes_key_and_tileset_from_config() {
        let config = TileConfig {
            azure_subscription_key: "secret".to_string(),
            ..TileConfig::default()
        };
        let mut surface = HeadlessSurface::new();
        let mut tiles = TileOverlay::new(&config, &mut surface, LayerPreference::default());
        tiles.set_server(&mut surface, TileServer::Azure);
        tiles.set_day_mode(&mut surface, false);
        let (url, zoom) = drawn(&surface, &tiles);
        assert!(url.contains("subscription-key=secret"));
        assert!(url.contains("tilesetId=microsoft.base.darkgrey"));
        assert_eq!(zoom, 18);
    }

    #[test]
    fn world_map_layer_key() {
        let mut surface = HeadlessSurface::new();
        let tiles =
            TileOverlay::new(&TileConfig::default(), &mut surface, LayerPreference::default());
        assert_eq!(tiles.layer().preference_key(), "Base.Setup.WorldMap");
    }
}
