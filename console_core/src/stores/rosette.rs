//! Range rings and azimuth spokes around a chain's sensor origin.

use console_proto::{ChainId, LayerId};

use super::{apply_opacity, apply_visibility, create_panes};
use crate::geo::{destination, LatLng};
use crate::preferences::LayerPreference;
use crate::render::{Entity, OpacityLevel, Pane, PaneId, RenderSurface, Shape};

const LINE_COLOUR: &str = "#327F7FFF";
const MAJOR_RING_SPACING_M: f64 = 1_000.0;
const MINOR_RING_SPACING_M: f64 = 500.0;
const TRIVIAL_RING_SPACING_M: f64 = 100.0;
const TRIVIAL_RING_LIMIT_M: f64 = 3_000.0;
/// Kilometre rings drawn at most; wider ranges still get full-length spokes.
const MAX_MAJOR_RINGS: u64 = 500;
const MINOR_SPOKE_SPACING_DEG: u32 = 30;
const MAJOR_LABEL_OFFSET: f64 = 1.06;
const MINOR_LABEL_OFFSET: f64 = 1.04;

#[derive(Debug)]
pub struct RosetteOverlay {
    layer: LayerId,
    major: PaneId,
    minor: PaneId,
    trivial: PaneId,
    labels: PaneId,
    visible: bool,
}

impl RosetteOverlay {
    pub fn new(
        chain: ChainId,
        surface: &mut dyn RenderSurface,
        preference: LayerPreference,
    ) -> Self {
        let layer = LayerId::Rosette(chain);
        let pane = |pane| PaneId::new(layer.clone(), pane);
        let overlay = Self {
            major: pane(Pane::RosetteMajor),
            minor: pane(Pane::RosetteMinor),
            trivial: pane(Pane::RosetteTrivial),
            labels: pane(Pane::RosetteLabels),
            layer,
            visible: preference.is_visible,
        };
        create_panes(
            surface,
            &overlay.panes(),
            preference.opacity.visual(),
            preference.is_visible,
        );
        overlay
    }

    pub fn layer(&self) -> &LayerId {
        &self.layer
    }

    pub fn panes(&self) -> [PaneId; 4] {
        [
            self.major.clone(),
            self.minor.clone(),
            self.trivial.clone(),
            self.labels.clone(),
        ]
    }

    /// Clear and redraw for `origin` and `range_m`. A non-positive or
    /// non-finite range, or a non-finite origin, leaves the overlay empty.
    pub fn initialize(
        &mut self,
        surface: &mut dyn RenderSurface,
        origin: LatLng,
        range_m: f64,
        preference: LayerPreference,
    ) {
        self.set_opacity(surface, preference.opacity);
        self.set_visible(surface, preference.is_visible);
        for pane in self.panes() {
            surface.set_entities(&pane, Vec::new());
        }
        if !range_m.is_finite() || range_m <= 0.0 || !origin.is_finite() {
            return;
        }

        let geometry = RosetteGeometry::build(origin, range_m);
        surface.set_entities(&self.major, geometry.major);
        surface.set_entities(&self.minor, geometry.minor);
        surface.set_entities(&self.trivial, geometry.trivial);
        surface.set_entities(&self.labels, geometry.labels);
    }

    pub fn set_opacity(&mut self, surface: &mut dyn RenderSurface, level: OpacityLevel) {
        apply_opacity(surface, &self.panes(), level.visual());
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, surface: &mut dyn RenderSurface, visible: bool) {
        self.visible = visible;
        apply_visibility(surface, &self.panes(), visible);
    }

    pub fn dispose(&mut self, surface: &mut dyn RenderSurface) {
        for pane in self.panes() {
            surface.remove_layer(&pane);
        }
    }
}

#[derive(Debug, Default)]
struct RosetteGeometry {
    major: Vec<Entity>,
    minor: Vec<Entity>,
    trivial: Vec<Entity>,
    labels: Vec<Entity>,
}

impl RosetteGeometry {
    fn build(origin: LatLng, range_m: f64) -> Self {
        let mut geometry = Self::default();
        let full_km = range_m / MAJOR_RING_SPACING_M;
        let majors = (full_km.floor() as u64).min(MAX_MAJOR_RINGS);

        for i in 1..=majors {
            let radius = i as f64 * MAJOR_RING_SPACING_M;
            geometry.major.push(ring(radius, origin));
            for j in 0..4u32 {
                let at = destination(origin, f64::from(j * 90), radius);
                geometry.labels.push(Entity::new(
                    format!("ring.{radius}.{j}"),
                    Shape::Label {
                        at,
                        text: format!("{}", (radius / 1_000.0).round()),
                    },
                ));
            }
        }

        // odd multiples of the minor spacing fall between the kilometre rings
        let minor_limit =
            ((2.0 * full_km - 1.0).max(0.0).floor() as u64).min(2 * MAX_MAJOR_RINGS);
        for i in (1..=minor_limit).step_by(2) {
            geometry
                .minor
                .push(ring(i as f64 * MINOR_RING_SPACING_M, origin));
        }

        let trivial_rings =
            (TRIVIAL_RING_LIMIT_M.min(range_m) / TRIVIAL_RING_SPACING_M).ceil() as u64;
        for i in (1..trivial_rings).filter(|i| i % 5 != 0) {
            geometry
                .trivial
                .push(ring(i as f64 * TRIVIAL_RING_SPACING_M, origin));
        }

        for azimuth in (0..360).step_by(MINOR_SPOKE_SPACING_DEG as usize) {
            let (pane, offset) = if azimuth % 90 == 0 {
                (&mut geometry.major, MAJOR_LABEL_OFFSET)
            } else {
                (&mut geometry.minor, MINOR_LABEL_OFFSET)
            };
            let bearing = f64::from(azimuth);
            pane.push(Entity::new(
                format!("spoke.{azimuth}"),
                Shape::Line {
                    points: vec![origin, destination(origin, bearing, range_m)],
                    colour: LINE_COLOUR.to_string(),
                },
            ));
            geometry.labels.push(Entity::new(
                format!("spoke.{azimuth}"),
                Shape::Label {
                    at: destination(origin, bearing, range_m * offset),
                    text: azimuth.to_string(),
                },
            ));
        }
        geometry
    }
}

fn ring(radius_m: f64, centre: LatLng) -> Entity {
    Entity::new(
        format!("ring.{radius_m}"),
        Shape::Circle {
            centre,
            radius_m,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessSurface;

    fn overlay(surface: &mut HeadlessSurface) -> RosetteOverlay {
        RosetteOverlay::new(
            ChainId::parse("A").unwrap(),
            surface,
            LayerPreference::default(),
        )
    }

    fn circles(surface: &HeadlessSurface, pane: &PaneId) -> Vec<f64> {
        surface
            .entities(pane)
            .iter()
            .filter_map(|entity| match entity.shape {
                Shape::Circle { radius_m, .. } => Some(radius_m),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rings_follow_kilometre_granularity() {
        let mut surface = HeadlessSurface::new();
        let mut rosette = overlay(&mut surface);
        rosette.initialize(
            &mut surface,
            LatLng::new(45.0, -75.0),
            2_500.0,
            LayerPreference::default(),
        );
        assert_eq!(circles(&surface, &rosette.major), vec![1_000.0, 2_000.0]);
        assert_eq!(circles(&surface, &rosette.minor), vec![500.0, 1_500.0]);
        let trivial = circles(&surface, &rosette.trivial);
        assert_eq!(trivial.len(), 20);
        assert!(trivial.iter().all(|r| r % 500.0 != 0.0));
        assert_eq!(trivial.last(), Some(&2_400.0));
    }

    #[test]
    fn spokes_and_labels() {
        let mut surface = HeadlessSurface::new();
        let mut rosette = overlay(&mut surface);
        rosette.initialize(
            &mut surface,
            LatLng::new(45.0, -75.0),
            2_000.0,
            LayerPreference::default(),
        );
        let spokes = |pane: &PaneId| {
            surface
                .entities(pane)
                .iter()
                .filter(|e| matches!(e.shape, Shape::Line { .. }))
                .count()
        };
        assert_eq!(spokes(&rosette.major), 4);
        assert_eq!(spokes(&rosette.minor), 8);
        // 4 labels per kilometre ring plus one per spoke
        assert_eq!(surface.entities(&rosette.labels).len(), 2 * 4 + 12);
    }

    #[test]
    fn invalid_range_or_origin_draws_nothing() {
        let mut surface = HeadlessSurface::new();
        let mut rosette = overlay(&mut surface);
        let origin = LatLng::new(45.0, -75.0);
        rosette.initialize(&mut surface, origin, 3_000.0, LayerPreference::default());
        assert!(surface.entity_count(rosette.layer()) > 0);

        for (origin, range) in [
            (origin, 0.0),
            (origin, -5.0),
            (origin, f64::NAN),
            (LatLng::new(f64::NAN, 0.0), 3_000.0),
        ] {
            rosette.initialize(&mut surface, origin, range, LayerPreference::default());
            assert_eq!(surface.entity_count(rosette.layer()), 0);
        }
    }

    #[test]
    fn reinitialize_is_idempotent() {
        let mut surface = HeadlessSurface::new();
        let mut rosette = overlay(&mut surface);
        let origin = LatLng::new(45.0, -75.0);
        rosette.initialize(&mut surface, origin, 1_500.0, LayerPreference::default());
        let first = surface.entity_count(rosette.layer());
        rosette.initialize(&mut surface, origin, 1_500.0, LayerPreference::default());
        assert_eq!(surface.entity_count(rosette.layer()), first);
        assert_eq!(surface.pane_count(), 4);
    }

    #[test]
    fn ring_count_is_capped_for_huge_ranges() {
        let mut surface = HeadlessSurface::new();
        let mut rosette = overlay(&mut surface);
        rosette.initialize(
            &mut surface,
            LatLng::new(45.0, -75.0),
            1.0e12,
            LayerPreference::default(),
        );
        let majors = circles(&surface, &rosette.major);
        assert_eq!(majors.len(), MAX_MAJOR_RINGS as usize);
        assert_eq!(majors.last(), Some(&500_000.0));
        assert_eq!(
            circles(&surface, &rosette.minor).len(),
            MAX_MAJOR_RINGS as usize
        );
        assert_eq!(circles(&surface, &rosette.trivial).len(), 24);
    }
}
