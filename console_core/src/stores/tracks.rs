use std::collections::VecDeque;

use console_proto::{palette_colour, Classification, DisplayType, LayerId, CONSOLE_PALETTE};

use super::keyed::KeyedEntities;
use super::{apply_opacity, apply_visibility, create_panes, LifecycleStore, StoreInit, StoreTask};
use crate::config::{ConsoleConfig, LayerConfig};
use crate::geo::LatLng;
use crate::render::{Entity, OpacityLevel, Pane, PaneId, RenderSurface, Shape, TrackSymbol};
use crate::schema::{Field, RecordError, RecordSchema};

/// One continuously updated target and its position history.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub position: LatLng,
    pub history: VecDeque<LatLng>,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    pub symbol: TrackSymbol,
    pub colour: &'static str,
    pub info: String,
}

impl Track {
    pub fn label(&self) -> String {
        if self.id.is_empty() {
            "TN:-".to_string()
        } else {
            format!("TN:{}", self.id)
        }
    }

    pub fn speed_text(&self) -> String {
        self.speed
            .map_or_else(|| "-".to_string(), |speed| format!("{:04}", speed.round() as i64))
    }

    pub fn bearing_text(&self) -> String {
        self.bearing
            .map_or_else(|| "-".to_string(), |bearing| format!("{:03}", bearing.round() as i64))
    }

    /// A trail exists once the track has moved at least once.
    pub fn has_trail(&self) -> bool {
        self.history.len() >= 2
    }

    fn target(&self) -> Shape {
        Shape::Target {
            at: self.position,
            symbol: self.symbol,
            colour: self.colour.to_string(),
            rotation_deg: self.bearing.unwrap_or(0.0),
            label: self.label(),
            speed: self.speed_text(),
            bearing: self.bearing_text(),
        }
    }

    fn trail(&self) -> Shape {
        Shape::Line {
            points: self.history.iter().copied().collect(),
            colour: self.colour.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct TrackPanes {
    hot_zones: PaneId,
    trails: PaneId,
    targets: PaneId,
    popups: PaneId,
}

impl TrackPanes {
    fn new(layer: &LayerId) -> Self {
        let pane = |pane| PaneId::new(layer.clone(), pane);
        Self {
            hot_zones: pane(Pane::TrackHotZones),
            trails: pane(Pane::TrackTrails),
            targets: pane(Pane::TrackTargets),
            popups: pane(Pane::TrackPopups),
        }
    }

    fn all(&self) -> [PaneId; 4] {
        [
            self.hot_zones.clone(),
            self.trails.clone(),
            self.targets.clone(),
            self.popups.clone(),
        ]
    }
}

#[derive(Debug)]
pub struct TrackStore {
    layer: LayerId,
    schema: RecordSchema,
    sensor_origin: LatLng,
    classifications: Vec<Classification>,
    trail_limit: usize,
    items: KeyedEntities<Track>,
    panes: TrackPanes,
    visible: bool,
}

impl TrackStore {
    pub fn new(init: StoreInit, layers: &LayerConfig, surface: &mut dyn RenderSurface) -> Self {
        let panes = TrackPanes::new(&init.layer);
        create_panes(
            surface,
            &panes.all(),
            init.preference.opacity.visual(),
            init.preference.is_visible,
        );
        let max_age = u64::from(layers.entity_timeout_factor) * init.refresh_period_ms;
        Self {
            layer: init.layer,
            schema: init.schema,
            sensor_origin: init.sensor_origin,
            classifications: init.classifications,
            trail_limit: layers.track_trail_limit.max(2),
            items: KeyedEntities::new(max_age),
            panes,
            visible: init.preference.is_visible,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Track> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.len() == 0
    }

    /// Remove every visual element of one track together.
    fn remove_visuals(&self, surface: &mut dyn RenderSurface, key: &str) {
        for pane in self.panes.all() {
            surface.remove_entity(&pane, key);
        }
    }

    fn evict(&mut self, surface: &mut dyn RenderSurface, now: u64) -> bool {
        let evicted = self.items.evict(now);
        for (key, _) in &evicted {
            self.remove_visuals(surface, key);
        }
        !evicted.is_empty()
    }
}

impl LifecycleStore for TrackStore {
    fn layer(&self) -> &LayerId {
        &self.layer
    }

    fn display(&self) -> DisplayType {
        DisplayType::Track
    }

    fn panes(&self) -> Vec<PaneId> {
        self.panes.all().to_vec()
    }

    fn poll_plan(&self, config: &ConsoleConfig) -> Vec<(StoreTask, u64)> {
        vec![
            (StoreTask::Refresh, config.timing.refresh_interval_ms),
            (StoreTask::Prune, config.timing.refresh_interval_ms),
        ]
    }

    fn enqueue(&mut self, line: &str, now: u64) -> Result<(), RecordError> {
        let record = self.schema.split(line)?;
        let id = record.unquoted(Field::Identifier)?.to_string();
        let class = record.classification(self.classifications.len())?;
        let placement = record.placement(self.sensor_origin)?;
        let speed = record.optional_number(Field::Speed).ok().flatten();
        let bearing = record.optional_number(Field::Bearing).ok().flatten();
        let info = if self.schema.has(Field::Info) {
            record.unquoted(Field::Info)?.to_string()
        } else {
            String::new()
        };
        let classification = &self.classifications[class];
        let symbol = TrackSymbol::from_index(classification.symbol_index);
        let colour = palette_colour(classification.palette_index).unwrap_or(CONSOLE_PALETTE[0]);
        let trail_limit = self.trail_limit;
        let position = placement.position;

        self.items.upsert(&id, now, |previous| {
            let mut history = previous.map(|track| track.history).unwrap_or_default();
            history.push_back(position);
            while history.len() > trail_limit {
                history.pop_front();
            }
            Track {
                id: id.clone(),
                position,
                history,
                speed,
                bearing,
                symbol,
                colour,
                info,
            }
        });
        Ok(())
    }

    fn refresh(&mut self, surface: &mut dyn RenderSurface, now: u64) {
        self.evict(surface, now);
        let panes = self.panes.clone();
        for (key, track) in self.items.take_dirty() {
            surface.add_entity(
                &panes.hot_zones,
                Entity::new(key, Shape::HotZone { at: track.position }),
            );
            if track.has_trail() {
                surface.add_entity(&panes.trails, Entity::new(key, track.trail()));
            }
            surface.add_entity(&panes.targets, Entity::new(key, track.target()));
            surface.add_entity(
                &panes.popups,
                Entity::new(
                    key,
                    Shape::Popup {
                        at: track.position,
                        text: track.info.clone(),
                    },
                ),
            );
        }
        surface.set_count(&self.layer, self.items.len());
    }

    fn prune(&mut self, surface: &mut dyn RenderSurface, now: u64) {
        if self.evict(surface, now) {
            surface.set_count(&self.layer, self.items.len());
        }
    }

    fn set_opacity(&mut self, surface: &mut dyn RenderSurface, level: OpacityLevel) {
        apply_opacity(surface, &self.panes.all(), level.visual());
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, surface: &mut dyn RenderSurface, visible: bool) {
        self.visible = visible;
        apply_visibility(surface, &self.panes.all(), visible);
    }

    fn activity_count(&self) -> usize {
        self.items.len()
    }

    fn dispose(&mut self, surface: &mut dyn RenderSurface) {
        self.items.clear();
        for pane in self.panes.all() {
            surface.remove_layer(&pane);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessSurface;
    use crate::stores::test_support;

    const HEADER: &str = "Identifier,Latitude,Longitude,Speed,Bearing,Type,Info";

    fn store(surface: &mut HeadlessSurface) -> TrackStore {
        let init = test_support::init(HEADER, DisplayType::Track, 3, 1_000);
        TrackStore::new(init, &LayerConfig::default(), surface)
    }

    #[test]
    fn target_label_pads_speed_and_bearing() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface);
        store
            .enqueue("\"42\",10.0,20.0,7.6,45.2,1,\"fast mover\"", 0)
            .unwrap();
        let track = store.get("42").unwrap();
        assert_eq!(track.label(), "TN:42");
        assert_eq!(track.speed_text(), "0008");
        assert_eq!(track.bearing_text(), "045");
        assert_eq!(track.symbol, TrackSymbol::Round);
        assert_eq!(track.info, "fast mover");
    }

    #[test]
    fn missing_speed_renders_a_dash() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface);
        store.enqueue("\"7\",10.0,20.0,,,0,\"\"", 0).unwrap();
        let track = store.get("7").unwrap();
        assert_eq!(track.speed_text(), "-");
        assert_eq!(track.bearing_text(), "-");
    }

    #[test]
    fn trail_appears_after_second_position() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface);
        let trails = store.panes.trails.clone();
        store.enqueue("\"1\",10.0,20.0,1,0,0,\"\"", 0).unwrap();
        store.refresh(&mut surface, 0);
        assert!(surface.entities(&trails).is_empty());
        assert_eq!(surface.entities(&store.panes.targets).len(), 1);

        store.enqueue("\"1\",10.1,20.1,1,0,0,\"\"", 500).unwrap();
        store.refresh(&mut surface, 1_000);
        let drawn = surface.entities(&trails);
        assert_eq!(drawn.len(), 1);
        match &drawn[0].shape {
            Shape::Line { points, .. } => assert_eq!(points.len(), 2),
            other => panic!("expected a trail line, got {other:?}"),
        }
    }

    #[test]
    fn eviction_removes_every_visual_of_a_track() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface);
        store.enqueue("\"1\",10.0,20.0,1,0,0,\"\"", 0).unwrap();
        store.enqueue("\"1\",10.1,20.1,1,0,0,\"\"", 0).unwrap();
        store.refresh(&mut surface, 0);
        assert_eq!(surface.entity_count(&test_support::layer()), 4);

        store.prune(&mut surface, 4_000);
        assert!(store.is_empty());
        assert_eq!(surface.entity_count(&test_support::layer()), 0);
        assert_eq!(surface.count(&test_support::layer()), Some(0));
    }

    #[test]
    fn trail_is_bounded() {
        let mut surface = HeadlessSurface::new();
        let init = test_support::init(HEADER, DisplayType::Track, 1, 1_000);
        let layers = LayerConfig {
            track_trail_limit: 3,
            ..LayerConfig::default()
        };
        let mut store = TrackStore::new(init, &layers, &mut surface);
        for i in 0..10 {
            let line = format!("\"1\",{}.0,20.0,1,0,0,\"\"", i);
            store.enqueue(&line, i).unwrap();
        }
        let track = store.get("1").unwrap();
        assert_eq!(track.history.len(), 3);
        assert_eq!(track.history.front(), Some(&LatLng::new(7.0, 20.0)));
    }
}
