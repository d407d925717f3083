use console_proto::{palette_colour, Classification, DisplayType, LayerId, CONSOLE_PALETTE};

use super::keyed::KeyedEntities;
use super::{apply_opacity, apply_visibility, create_panes, LifecycleStore, StoreInit, StoreTask};
use crate::config::{ConsoleConfig, LayerConfig};
use crate::geo::LatLng;
use crate::render::{Entity, OpacityLevel, Pane, PaneId, RenderSurface, Shape};
use crate::schema::{Field, RecordError, RecordSchema};

#[derive(Debug, Clone, PartialEq)]
pub struct Strobe {
    pub origin: LatLng,
    pub destination: LatLng,
    pub colour: &'static str,
}

impl Strobe {
    fn shape(&self) -> Shape {
        Shape::Line {
            points: vec![self.origin, self.destination],
            colour: self.colour.to_string(),
        }
    }
}

/// Bearing lines keyed by detection identifier, evicted when stale.
#[derive(Debug)]
pub struct StrobeStore {
    layer: LayerId,
    schema: RecordSchema,
    sensor_origin: LatLng,
    classifications: Vec<Classification>,
    items: KeyedEntities<Strobe>,
    pane: PaneId,
    visible: bool,
}

impl StrobeStore {
    pub fn new(init: StoreInit, layers: &LayerConfig, surface: &mut dyn RenderSurface) -> Self {
        let pane = PaneId::new(init.layer.clone(), Pane::Strobes);
        create_panes(
            surface,
            std::slice::from_ref(&pane),
            init.preference.opacity.visual(),
            init.preference.is_visible,
        );
        let max_age = u64::from(layers.entity_timeout_factor) * init.refresh_period_ms;
        Self {
            layer: init.layer,
            schema: init.schema,
            sensor_origin: init.sensor_origin,
            classifications: init.classifications,
            items: KeyedEntities::new(max_age),
            pane,
            visible: init.preference.is_visible,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Strobe> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.len() == 0
    }

    fn evict(&mut self, surface: &mut dyn RenderSurface, now: u64) -> bool {
        let evicted = self.items.evict(now);
        for (key, _) in &evicted {
            surface.remove_entity(&self.pane, key);
        }
        !evicted.is_empty()
    }
}

impl LifecycleStore for StrobeStore {
    fn layer(&self) -> &LayerId {
        &self.layer
    }

    fn display(&self) -> DisplayType {
        DisplayType::Strobe
    }

    fn panes(&self) -> Vec<PaneId> {
        vec![self.pane.clone()]
    }

    fn poll_plan(&self, config: &ConsoleConfig) -> Vec<(StoreTask, u64)> {
        vec![
            (StoreTask::Refresh, config.timing.refresh_interval_ms),
            (StoreTask::Prune, config.timing.refresh_interval_ms),
        ]
    }

    fn enqueue(&mut self, line: &str, now: u64) -> Result<(), RecordError> {
        let record = self.schema.split(line)?;
        let id = record.unquoted(Field::Identifier)?;
        if id.is_empty() {
            return Err(RecordError::Undeclared(Field::Identifier));
        }
        let class = record.classification(self.classifications.len())?;
        let placement = record.placement(self.sensor_origin)?;
        let colour = palette_colour(self.classifications[class].palette_index)
            .unwrap_or(CONSOLE_PALETTE[0]);
        self.items.upsert(id, now, |_| Strobe {
            origin: placement.origin,
            destination: placement.position,
            colour,
        });
        Ok(())
    }

    fn refresh(&mut self, surface: &mut dyn RenderSurface, now: u64) {
        self.evict(surface, now);
        for (key, strobe) in self.items.take_dirty() {
            surface.add_entity(&self.pane, Entity::new(key, strobe.shape()));
        }
        surface.set_count(&self.layer, self.items.len());
    }

    fn prune(&mut self, surface: &mut dyn RenderSurface, now: u64) {
        if self.evict(surface, now) {
            surface.set_count(&self.layer, self.items.len());
        }
    }

    fn set_opacity(&mut self, surface: &mut dyn RenderSurface, level: OpacityLevel) {
        apply_opacity(surface, std::slice::from_ref(&self.pane), level.visual());
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, surface: &mut dyn RenderSurface, visible: bool) {
        self.visible = visible;
        apply_visibility(surface, std::slice::from_ref(&self.pane), visible);
    }

    fn activity_count(&self) -> usize {
        self.items.len()
    }

    fn dispose(&mut self, surface: &mut dyn RenderSurface) {
        self.items.clear();
        surface.remove_layer(&self.pane);
    }
}
