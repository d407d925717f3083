//! Per-layer data lifecycle stores.
//!
//! Every data layer owns one store. A store ingests decoded record lines,
//! ages its contents out, and pushes what is left to the render surface when
//! its poll timers fire. Static overlays (rosette, world tiles) have no
//! ingestion and are rebuilt wholesale instead.

mod density;
mod keyed;
pub mod heat_map;
pub mod plots;
pub mod rosette;
pub mod strobes;
pub mod tiles;
pub mod tracks;

use console_proto::{Classification, DisplayType, LayerId};

use crate::config::ConsoleConfig;
use crate::geo::LatLng;
use crate::preferences::LayerPreference;
use crate::render::{OpacityLevel, PaneId, RenderSurface};
use crate::schema::{RecordError, RecordSchema};

pub use heat_map::HeatMapStore;
pub use plots::PlotStore;
pub use rosette::RosetteOverlay;
pub use strobes::StrobeStore;
pub use tiles::TileOverlay;
pub use tracks::TrackStore;

/// Everything a data store needs at construction.
#[derive(Debug, Clone)]
pub struct StoreInit {
    pub layer: LayerId,
    pub sensor_origin: LatLng,
    pub schema: RecordSchema,
    pub classifications: Vec<Classification>,
    pub refresh_period_ms: u64,
    /// Resolution cell diameter declared for heat maps.
    pub dot_size_m: Option<f64>,
    pub preference: LayerPreference,
}

/// Which periodic action a poll handle drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTask {
    Refresh,
    Prune,
}

pub trait LifecycleStore: Send {
    fn layer(&self) -> &LayerId;

    fn display(&self) -> DisplayType;

    /// Panes this store draws into.
    fn panes(&self) -> Vec<PaneId>;

    /// Poll cadence per task, in milliseconds.
    fn poll_plan(&self, config: &ConsoleConfig) -> Vec<(StoreTask, u64)>;

    /// Decode one record line into the active buffer.
    fn enqueue(&mut self, line: &str, now: u64) -> Result<(), RecordError>;

    fn refresh(&mut self, surface: &mut dyn RenderSurface, now: u64);

    fn prune(&mut self, surface: &mut dyn RenderSurface, now: u64);

    fn set_opacity(&mut self, surface: &mut dyn RenderSurface, level: OpacityLevel);

    fn is_visible(&self) -> bool;

    fn set_visible(&mut self, surface: &mut dyn RenderSurface, visible: bool);

    /// Last activity count pushed to the surface.
    fn activity_count(&self) -> usize;

    /// Release every pane and entity this store owns.
    fn dispose(&mut self, surface: &mut dyn RenderSurface) {
        for pane in self.panes() {
            surface.remove_layer(&pane);
        }
    }
}

pub(crate) fn create_panes(
    surface: &mut dyn RenderSurface,
    panes: &[PaneId],
    opacity: f32,
    visible: bool,
) {
    for pane in panes {
        surface.create_layer(pane);
        surface.set_opacity(pane, opacity);
        surface.set_visible(pane, visible);
    }
}

pub(crate) fn apply_opacity(surface: &mut dyn RenderSurface, panes: &[PaneId], opacity: f32) {
    for pane in panes {
        surface.set_opacity(pane, opacity);
    }
}

pub(crate) fn apply_visibility(surface: &mut dyn RenderSurface, panes: &[PaneId], visible: bool) {
    for pane in panes {
        surface.set_visible(pane, visible);
    }
}

/// Build the store matching the schema's display type and create its panes.
pub fn build_store(
    init: StoreInit,
    config: &ConsoleConfig,
    surface: &mut dyn RenderSurface,
) -> Box<dyn LifecycleStore> {
    match init.schema.display() {
        DisplayType::HeatMap => Box::new(HeatMapStore::new(init, &config.layers, surface)),
        DisplayType::Plot => Box::new(PlotStore::new(init, &config.layers, surface)),
        DisplayType::Strobe => Box::new(StrobeStore::new(init, &config.layers, surface)),
        DisplayType::Track => Box::new(TrackStore::new(init, &config.layers, surface)),
    }
}
