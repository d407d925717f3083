//! Arena of live layer stores and the poll handles that drive them.

use std::collections::BTreeMap;

use console_proto::{ChainId, LayerId};
use tracing::debug;

use crate::config::{TileConfig, TileServer};
use crate::geo::LatLng;
use crate::preferences::PreferenceCache;
use crate::render::{OpacityLevel, RenderSurface};
use crate::scheduler::{PollHandle, PollScheduler};
use crate::stores::{LifecycleStore, RosetteOverlay, StoreTask, TileOverlay};

/// Token the console's scheduler hands back when a poll falls due.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PollTask {
    Store { layer: LayerId, task: StoreTask },
    StatusSweep,
}

struct ActiveStore {
    store: Box<dyn LifecycleStore>,
    handles: Vec<PollHandle>,
}

/// Summary row for front-ends.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSummary {
    pub layer: LayerId,
    pub kind: String,
    pub opacity: OpacityLevel,
    pub visible: bool,
    pub activity: usize,
}

#[derive(Default)]
pub struct LayerRegistry {
    stores: BTreeMap<LayerId, ActiveStore>,
    rosettes: BTreeMap<ChainId, RosetteOverlay>,
    tiles: Option<TileOverlay>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, layer: &LayerId) -> bool {
        self.stores.contains_key(layer)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn store(&self, layer: &LayerId) -> Option<&dyn LifecycleStore> {
        self.stores.get(layer).map(|active| active.store.as_ref())
    }

    pub fn store_mut(&mut self, layer: &LayerId) -> Option<&mut (dyn LifecycleStore + 'static)> {
        self.stores.get_mut(layer).map(|active| active.store.as_mut())
    }

    /// Take ownership of `store` and arm its poll plan.
    pub fn insert(
        &mut self,
        store: Box<dyn LifecycleStore>,
        plan: Vec<(StoreTask, u64)>,
        scheduler: &mut PollScheduler<PollTask>,
        now: u64,
    ) {
        let layer = store.layer().clone();
        let handles = plan
            .into_iter()
            .map(|(task, interval_ms)| {
                scheduler.schedule(
                    now,
                    interval_ms,
                    PollTask::Store {
                        layer: layer.clone(),
                        task,
                    },
                )
            })
            .collect();
        self.stores.insert(layer, ActiveStore { store, handles });
    }

    pub fn run(
        &mut self,
        layer: &LayerId,
        task: StoreTask,
        surface: &mut dyn RenderSurface,
        now: u64,
    ) {
        let Some(active) = self.stores.get_mut(layer) else {
            return;
        };
        match task {
            StoreTask::Refresh => active.store.refresh(surface, now),
            StoreTask::Prune => active.store.prune(surface, now),
        }
    }

    /// Cancel a store's timers and release its panes.
    pub fn dispose(
        &mut self,
        layer: &LayerId,
        scheduler: &mut PollScheduler<PollTask>,
        surface: &mut dyn RenderSurface,
    ) -> bool {
        if let LayerId::Rosette(chain) = layer {
            return match self.rosettes.remove(chain) {
                Some(mut rosette) => {
                    rosette.dispose(surface);
                    true
                }
                None => false,
            };
        }
        let Some(mut active) = self.stores.remove(layer) else {
            return false;
        };
        for handle in active.handles.drain(..) {
            scheduler.cancel(handle);
        }
        active.store.dispose(surface);
        debug!(
            target: "sensor_console::layers",
            layer = %layer,
            "layer.disposed"
        );
        true
    }

    /// Dispose every data store and rosette; the world map survives.
    pub fn dispose_all(
        &mut self,
        scheduler: &mut PollScheduler<PollTask>,
        surface: &mut dyn RenderSurface,
    ) {
        let layers: Vec<LayerId> = self.stores.keys().cloned().collect();
        for layer in layers {
            self.dispose(&layer, scheduler, surface);
        }
        for (_, mut rosette) in std::mem::take(&mut self.rosettes) {
            rosette.dispose(surface);
        }
    }

    /// Create the chain's rosette if needed and rebuild it.
    pub fn draw_rosette(
        &mut self,
        chain: &ChainId,
        origin: LatLng,
        range_m: f64,
        preferences: &mut PreferenceCache,
        surface: &mut dyn RenderSurface,
    ) {
        let preference = preferences.get(&LayerId::Rosette(chain.clone()));
        let rosette = self
            .rosettes
            .entry(chain.clone())
            .or_insert_with(|| RosetteOverlay::new(chain.clone(), surface, preference));
        rosette.initialize(surface, origin, range_m, preference);
    }

    pub fn rosette(&self, chain: &ChainId) -> Option<&RosetteOverlay> {
        self.rosettes.get(chain)
    }

    pub fn ensure_tiles(
        &mut self,
        config: &TileConfig,
        preferences: &mut PreferenceCache,
        surface: &mut dyn RenderSurface,
    ) -> &mut TileOverlay {
        self.tiles.get_or_insert_with(|| {
            TileOverlay::new(config, surface, preferences.get(&LayerId::WorldMap))
        })
    }

    pub fn tiles(&self) -> Option<&TileOverlay> {
        self.tiles.as_ref()
    }

    pub fn set_tile_mode(
        &mut self,
        surface: &mut dyn RenderSurface,
        day_mode: bool,
        server: TileServer,
    ) {
        if let Some(tiles) = self.tiles.as_mut() {
            tiles.set_day_mode(surface, day_mode);
            tiles.set_server(surface, server);
        }
    }

    /// Returns `false` when no live layer answers to `layer`.
    pub fn set_opacity(
        &mut self,
        layer: &LayerId,
        level: OpacityLevel,
        surface: &mut dyn RenderSurface,
    ) -> bool {
        match layer {
            LayerId::WorldMap => self
                .tiles
                .as_mut()
                .map(|t| t.set_opacity(surface, level))
                .is_some(),
            LayerId::Rosette(chain) => self
                .rosettes
                .get_mut(chain)
                .map(|r| r.set_opacity(surface, level))
                .is_some(),
            LayerId::Stream(_) => self
                .stores
                .get_mut(layer)
                .map(|a| a.store.set_opacity(surface, level))
                .is_some(),
        }
    }

    pub fn set_visible(
        &mut self,
        layer: &LayerId,
        visible: bool,
        surface: &mut dyn RenderSurface,
    ) -> bool {
        match layer {
            LayerId::WorldMap => self
                .tiles
                .as_mut()
                .map(|t| t.set_visible(surface, visible))
                .is_some(),
            LayerId::Rosette(chain) => self
                .rosettes
                .get_mut(chain)
                .map(|r| r.set_visible(surface, visible))
                .is_some(),
            LayerId::Stream(_) => self
                .stores
                .get_mut(layer)
                .map(|a| a.store.set_visible(surface, visible))
                .is_some(),
        }
    }

    pub fn summaries(&self, preferences: &mut PreferenceCache) -> Vec<LayerSummary> {
        let mut rows = Vec::new();
        if let Some(tiles) = &self.tiles {
            rows.push(LayerSummary {
                layer: LayerId::WorldMap,
                kind: "Tiles".to_string(),
                opacity: preferences.get(&LayerId::WorldMap).opacity,
                visible: tiles.is_visible(),
                activity: 0,
            });
        }
        for rosette in self.rosettes.values() {
            rows.push(LayerSummary {
                layer: rosette.layer().clone(),
                kind: "Rosette".to_string(),
                opacity: preferences.get(rosette.layer()).opacity,
                visible: rosette.is_visible(),
                activity: 0,
            });
        }
        for (layer, active) in &self.stores {
            rows.push(LayerSummary {
                layer: layer.clone(),
                kind: active.store.display().to_string(),
                opacity: preferences.get(layer).opacity,
                visible: active.store.is_visible(),
                activity: active.store.activity_count(),
            });
        }
        rows
    }
}
