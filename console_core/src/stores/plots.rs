use console_proto::{palette_colour, Classification, DisplayType, LayerId};

use super::density::DensityRing;
use super::{apply_opacity, apply_visibility, create_panes, LifecycleStore, StoreInit, StoreTask};
use crate::config::{ConsoleConfig, LayerConfig};
use crate::geo::LatLng;
use crate::render::{Entity, OpacityLevel, Pane, PaneId, RenderSurface, Shape};
use crate::schema::{RecordError, RecordSchema};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotHit {
    pub class: usize,
    pub at: LatLng,
}

/// Classified detections kept across several scans, newest scan on top.
#[derive(Debug)]
pub struct PlotStore {
    layer: LayerId,
    schema: RecordSchema,
    sensor_origin: LatLng,
    classifications: Vec<Classification>,
    refresh_period_ms: u64,
    ring: DensityRing<PlotHit>,
    visible: bool,
}

impl PlotStore {
    pub fn new(init: StoreInit, layers: &LayerConfig, surface: &mut dyn RenderSurface) -> Self {
        let store = Self {
            ring: DensityRing::new(layers.plot_scan_history, init.refresh_period_ms),
            layer: init.layer,
            schema: init.schema,
            sensor_origin: init.sensor_origin,
            classifications: init.classifications,
            refresh_period_ms: init.refresh_period_ms,
            visible: init.preference.is_visible,
        };
        create_panes(
            surface,
            &store.panes(),
            init.preference.opacity.visual(),
            init.preference.is_visible,
        );
        store
    }

    fn pane(&self, generation: usize, class: usize) -> PaneId {
        PaneId::new(self.layer.clone(), Pane::Plot { generation, class })
    }

    /// Colour of a classification's heat layer.
    pub fn colour(&self, class: usize) -> Option<&'static str> {
        self.classifications
            .get(class)
            .and_then(|c| palette_colour(c.palette_index))
    }

    pub fn active(&self) -> &[PlotHit] {
        self.ring.active()
    }

    fn render_generation(&self, surface: &mut dyn RenderSurface, generation: usize) {
        let hits = self.ring.generation(generation);
        for class in 0..self.classifications.len() {
            let entities = hits
                .iter()
                .filter(|hit| hit.class == class)
                .enumerate()
                .map(|(i, hit)| {
                    Entity::new(
                        i.to_string(),
                        Shape::Point {
                            at: hit.at,
                            weight: 1.0,
                        },
                    )
                })
                .collect();
            surface.set_entities(&self.pane(generation, class), entities);
        }
    }
}

impl LifecycleStore for PlotStore {
    fn layer(&self) -> &LayerId {
        &self.layer
    }

    fn display(&self) -> DisplayType {
        DisplayType::Plot
    }

    fn panes(&self) -> Vec<PaneId> {
        (0..self.ring.len())
            .flat_map(|generation| {
                (0..self.classifications.len()).map(move |class| (generation, class))
            })
            .map(|(generation, class)| self.pane(generation, class))
            .collect()
    }

    fn poll_plan(&self, config: &ConsoleConfig) -> Vec<(StoreTask, u64)> {
        vec![
            (StoreTask::Refresh, config.timing.refresh_interval_ms),
            (StoreTask::Prune, self.refresh_period_ms),
        ]
    }

    fn enqueue(&mut self, line: &str, _now: u64) -> Result<(), RecordError> {
        let record = self.schema.split(line)?;
        let class = record.classification(self.classifications.len())?;
        let placement = record.placement(self.sensor_origin)?;
        self.ring.push(PlotHit {
            class,
            at: placement.position,
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
        apply_opacity(surface, &self.panes(), level.visual());
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, surface: &mut dyn RenderSurface, visible: bool) {
        self.visible = visible;
        apply_visibility(surface, &self.panes(), visible);
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

    fn store(surface: &mut HeadlessSurface, classes: usize) -> PlotStore {
        let init =
            test_support::init("Type,Latitude,Longitude", DisplayType::Plot, classes, 1_000);
        PlotStore::new(init, &LayerConfig::default(), surface)
    }

    #[test]
    fn panes_cover_every_generation_and_class() {
        let mut surface = HeadlessSurface::new();
        let store = store(&mut surface, 2);
        assert_eq!(store.panes().len(), 12);
        assert_eq!(surface.pane_count(), 12);
        assert_eq!(
            store.panes()[3].to_string(),
            "A.S1.T1.plotViews.1.1"
        );
    }

    #[test]
    fn refresh_draws_hits_into_their_class_pane() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface, 2);
        store.enqueue("0,10.0,20.0", 0).unwrap();
        store.enqueue("1,11.0,21.0", 0).unwrap();
        store.enqueue("1,12.0,22.0", 0).unwrap();
        store.refresh(&mut surface, 1_000);

        let class0 = surface.entities(&store.pane(0, 0));
        assert_eq!(class0.len(), 1);
        assert_eq!(
            class0[0].shape,
            Shape::Point {
                at: LatLng::new(10.0, 20.0),
                weight: 1.0
            }
        );
        assert_eq!(surface.entities(&store.pane(0, 1)).len(), 2);
        assert_eq!(store.activity_count(), 3);
    }

    #[test]
    fn undeclared_classification_is_dropped() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface, 1);
        assert!(matches!(
            store.enqueue("3,10.0,20.0", 0),
            Err(RecordError::UnknownClassification(_))
        ));
        assert!(store.active().is_empty());
    }

    #[test]
    fn history_empties_after_a_full_ring_of_prunes() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface, 1);
        store.enqueue("0,10.0,20.0", 0).unwrap();
        store.refresh(&mut surface, 0);
        for _ in 0..LayerConfig::default().plot_scan_history {
            store.prune(&mut surface, 0);
        }
        assert!(store.active().is_empty());
        assert_eq!(surface.entity_count(&test_support::layer()), 0);
    }

    #[test]
    fn hits_arriving_after_the_last_refresh_are_drawn_on_prune() {
        let mut surface = HeadlessSurface::new();
        let mut store = store(&mut surface, 1);
        store.enqueue("0,10.0,20.0", 0).unwrap();
        store.refresh(&mut surface, 1_000);
        store.enqueue("0,11.0,21.0", 1_200).unwrap();
        store.prune(&mut surface, 1_500);
        store.refresh(&mut surface, 2_000);

        assert_eq!(surface.entities(&store.pane(0, 0)).len(), 2);
        assert!(surface.entities(&store.pane(1, 0)).is_empty());
    }
}
