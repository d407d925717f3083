use console_proto::{DisplayType, HeatGradient, LayerId};

use super::density::DensityRing;
use super::{apply_opacity, apply_visibility, create_panes, LifecycleStore, StoreInit, StoreTask};
use crate::config::{ConsoleConfig, LayerConfig};
use crate::geo::LatLng;
use crate::render::{Entity, OpacityLevel, Pane, PaneId, RenderSurface, Shape};
use crate::schema::{Field, RecordError, RecordSchema};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatCell {
    pub at: LatLng,
    pub intensity: f64,
}

/// Clutter intensity layer: one pane per ring generation.
#[derive(Debug)]
pub struct HeatMapStore {
    layer: LayerId,
    schema: RecordSchema,
    sensor_origin: LatLng,
    refresh_period_ms: u64,
    ring: DensityRing<HeatCell>,
    panes: Vec<PaneId>,
    gradient: HeatGradient,
    dot_size_m: Option<f64>,
    visible: bool,
}

impl HeatMapStore {
    pub fn new(init: StoreInit, layers: &LayerConfig, surface: &mut dyn RenderSurface) -> Self {
        let ring = DensityRing::new(layers.heat_map_scan_history, init.refresh_period_ms);
        let panes: Vec<PaneId> = (0..ring.len())
            .map(|generation| PaneId::new(init.layer.clone(), Pane::HeatMap { generation }))
            .collect();
        create_panes(
            surface,
            &panes,
            init.preference.opacity.heat_map_visual(),
            init.preference.is_visible,
        );
        Self {
            layer: init.layer,
            schema: init.schema,
            sensor_origin: init.sensor_origin,
            refresh_period_ms: init.refresh_period_ms,
            ring,
            panes,
            gradient: HeatGradient::Magma,
            dot_size_m: init.dot_size_m,
            visible: init.preference.is_visible,
        }
    }

    pub fn gradient(&self) -> HeatGradient {
        self.gradient
    }

    pub fn dot_size_m(&self) -> Option<f64> {
        self.dot_size_m
    }

    pub fn active(&self) -> &[HeatCell] {
        self.ring.active()
    }

    fn render_generation(&self, surface: &mut dyn RenderSurface, generation: usize) {
        let entities = self
            .ring
            .generation(generation)
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                Entity::new(
                    i.to_string(),
                    Shape::Point {
                        at: cell.at,
                        weight: cell.intensity,
                    },
                )
            })
            .collect();
        surface.set_entities(&self.panes[generation], entities);
    }
}

impl LifecycleStore for HeatMapStore {
    fn layer(&self) -> &LayerId {
        &self.layer
    }

    fn display(&self) -> DisplayType {
        DisplayType::HeatMap
    }

    fn panes(&self) -> Vec<PaneId> {
        self.panes.clone()
    }

    fn poll_plan(&self, config: &ConsoleConfig) -> Vec<(StoreTask, u64)> {
        vec![
            (StoreTask::Refresh, config.timing.refresh_interval_ms),
            (StoreTask::Prune, self.refresh_period_ms),
        ]
    }

    fn enqueue(&mut self, line: &str, _now: u64) -> Result<(), RecordError> {
        let record = self.schema.split(line)?;
        let placement = record.placement(self.sensor_origin)?;
        let intensity = record.optional_number(Field::Intensity)?.unwrap_or(1.0);
        self.ring.push(HeatCell {
            at: placement.position,
            intensity,
        });
        Ok(())
    }

    fn refresh(&mut self, surface: &mut dyn RenderSurface, _now: u64) {
        self.render_generation(surface, self.ring.current_index());
        let count = self.ring.tally();
        surface.set_count(&self.layer, count);
    }

    fn prune(&mut self, surface: &mut dyn RenderSurface, _now: u64) {
        // the retired generation keeps whatever arrived since the last refresh
        self.render_generation(surface, self.ring.current_index());
        let current = self.ring.rotate();
        self.render_generation(surface, current);
    }

    fn set_opacity(&mut self, surface: &mut dyn RenderSurface, level: OpacityLevel) {
        apply_opacity(surface, &self.panes, level.heat_map_visual());
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, surface: &mut dyn RenderSurface, visible: bool) {
        self.visible = visible;
        apply_visibility(surface, &self.panes, visible);
    }

    fn activity_count(&self) -> usize {
        self.ring.displayed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessSurface;
    use crate::stores::test_support;

    fn store(surface: &mut HeadlessSurface) -> HeatMapStore {
        let init =
            test_support::init("Intensity,Latitude,Longitude", DisplayType::HeatMap, 0, 2_000);
        HeatMapStore::new(init, &LayerConfig::default(), surface)
    }

    #[test]
    fn creates_one_pane_per_generation_at_quarter_scaled_opacity() {
        let mut surface = HeadlessSurface::new();
        let store = store(&mut surface);
        assert_eq!(store.panes().len(), 2);
        let pane = surface.pane(&store.panes()[0]).unwrap();
        assert!((pane.opacity - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn refresh_pushes_active_cells_and_counts() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface);
        store.enqueue("5,1.0,2.0", 0).unwrap();
        store.enqueue("7,1.5,2.5", 0).unwrap();
        store.refresh(&mut surface, 0);
        let cells = surface.entities(&store.panes()[0]);
        assert_eq!(cells.len(), 2);
        assert_eq!(
            cells[1].shape,
            Shape::Point {
                at: LatLng::new(1.5, 2.5),
                weight: 7.0
            }
        );
        assert_eq!(surface.count(&test_support::layer()), Some(2));
    }

    #[test]
    fn two_prunes_without_input_clear_the_ring() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface);
        store.enqueue("1,1.0,2.0", 0).unwrap();
        store.prune(&mut surface, 0);
        assert!(store.active().is_empty());
        store.prune(&mut surface, 0);
        assert_eq!(surface.entity_count(&test_support::layer()), 0);
    }

    #[test]
    fn malformed_lines_are_rejected_individually() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface);
        assert!(store.enqueue("1,north,2.0", 0).is_err());
        assert!(store.enqueue("1,1.0", 0).is_err());
        store.enqueue("1,1.0,2.0", 0).unwrap();
        assert_eq!(store.active().len(), 1);
    }

    #[test]
    fn cells_arriving_after_the_last_refresh_are_drawn_on_prune() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface);
        store.enqueue("1,1.0,2.0", 0).unwrap();
        store.refresh(&mut surface, 1_000);
        store.enqueue("1,1.5,2.5", 1_200).unwrap();
        store.prune(&mut surface, 1_500);
        store.refresh(&mut surface, 2_000);

        assert_eq!(surface.entities(&store.panes()[0]).len(), 2);
        assert_eq!(surface.entity_count(&test_support::layer()), 2);
    }
}
