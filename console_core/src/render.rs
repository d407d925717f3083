//! Narrow interface to the map-rendering substrate.
//!
//! Stores never draw; they describe what a pane should contain and hand it
//! to a [`RenderSurface`]. [`HeadlessSurface`] keeps the latest description
//! of every pane in memory for tests and the terminal inspector.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use console_proto::LayerId;
use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

/// Tri-state layer opacity persisted per layer: 0 low, 1 medium, 2 high.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(from = "u8", into = "u8")]
pub struct OpacityLevel(u8);

impl OpacityLevel {
    pub const LOW: OpacityLevel = OpacityLevel(0);
    pub const MEDIUM: OpacityLevel = OpacityLevel(1);
    pub const HIGH: OpacityLevel = OpacityLevel(2);

    /// Out-of-range levels saturate at [`OpacityLevel::HIGH`].
    pub fn new(level: u8) -> Self {
        Self(level.min(2))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// Visual opacity for line and marker renderers, `(1 + level) / 3`.
    pub fn visual(self) -> f32 {
        f32::from(1 + self.0) / 3.0
    }

    /// Heat maps render a step fainter, `(1 + level) / 4`.
    pub fn heat_map_visual(self) -> f32 {
        f32::from(1 + self.0) / 4.0
    }
}

impl From<u8> for OpacityLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}

impl From<OpacityLevel> for u8 {
    fn from(level: OpacityLevel) -> Self {
        level.0
    }
}

/// Named drawing pane inside one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pane {
    HeatMap { generation: usize },
    Plot { generation: usize, class: usize },
    Strobes,
    TrackHotZones,
    TrackTrails,
    TrackTargets,
    TrackPopups,
    RosetteMajor,
    RosetteMinor,
    RosetteTrivial,
    RosetteLabels,
    Tiles,
}

impl fmt::Display for Pane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pane::HeatMap { generation } => write!(f, "heatMapMarkerView.{generation}"),
            Pane::Plot { generation, class } => write!(f, "plotViews.{generation}.{class}"),
            Pane::Strobes => f.write_str("strobeViews"),
            Pane::TrackHotZones => f.write_str("trackHotZoneViews"),
            Pane::TrackTrails => f.write_str("trackTrailViews"),
            Pane::TrackTargets => f.write_str("trackTargetViews"),
            Pane::TrackPopups => f.write_str("trackPopupViews"),
            Pane::RosetteMajor => f.write_str("majorLineViews"),
            Pane::RosetteMinor => f.write_str("minorLineViews"),
            Pane::RosetteTrivial => f.write_str("trivialLineViews"),
            Pane::RosetteLabels => f.write_str("labelViews"),
            Pane::Tiles => f.write_str("tileViews"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaneId {
    pub layer: LayerId,
    pub pane: Pane,
}

impl PaneId {
    pub fn new(layer: LayerId, pane: Pane) -> Self {
        Self { layer, pane }
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.layer, self.pane)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSymbol {
    Sharp,
    Round,
    Flat,
}

impl TrackSymbol {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => TrackSymbol::Round,
            2 => TrackSymbol::Flat,
            _ => TrackSymbol::Sharp,
        }
    }

    /// SVG path drawn inside a 54x54 view box, pointing north.
    pub fn path(self) -> &'static str {
        match self {
            TrackSymbol::Sharp => "m 26,9 -7,25 7,-8 7,8 z",
            TrackSymbol::Round => "m 26,15 c -7,0 -7,10 -7,10 v 9 l 7,-8 7,8 v -9 c 0,0 0,-10 -7,-10 z",
            TrackSymbol::Flat => "m 19,17 v 17 l 7,-8 7,8 V 17 Z",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Weighted density sample (heat-map cell or plot hit).
    Point { at: LatLng, weight: f64 },
    Line { points: Vec<LatLng>, colour: String },
    Circle { centre: LatLng, radius_m: f64 },
    Label { at: LatLng, text: String },
    Target {
        at: LatLng,
        symbol: TrackSymbol,
        colour: String,
        rotation_deg: f64,
        label: String,
        speed: String,
        bearing: String,
    },
    Popup { at: LatLng, text: String },
    HotZone { at: LatLng },
    Tiles { url: String, max_zoom: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub key: String,
    pub shape: Shape,
}

impl Entity {
    pub fn new(key: impl Into<String>, shape: Shape) -> Self {
        Self {
            key: key.into(),
            shape,
        }
    }
}

pub trait RenderSurface {
    fn create_layer(&mut self, pane: &PaneId);
    fn remove_layer(&mut self, pane: &PaneId);
    /// Replace everything drawn in `pane`.
    fn set_entities(&mut self, pane: &PaneId, entities: Vec<Entity>);
    /// Insert `entity`, replacing any entity with the same key.
    fn add_entity(&mut self, pane: &PaneId, entity: Entity);
    fn remove_entity(&mut self, pane: &PaneId, key: &str);
    fn set_opacity(&mut self, pane: &PaneId, opacity: f32);
    fn set_visible(&mut self, pane: &PaneId, visible: bool);
    fn recenter(&mut self, origin: LatLng, bounds_radius_m: f64);
    /// On-screen activity counter of a layer.
    fn set_count(&mut self, layer: &LayerId, count: usize);
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaneState {
    pub entities: Vec<Entity>,
    pub opacity: f32,
    pub visible: bool,
}

impl Default for PaneState {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            opacity: 1.0,
            visible: true,
        }
    }
}

/// In-memory surface that remembers the latest state of every pane.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    panes: BTreeMap<PaneId, PaneState>,
    counts: HashMap<LayerId, usize>,
    center: Option<(LatLng, f64)>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pane(&self, pane: &PaneId) -> Option<&PaneState> {
        self.panes.get(pane)
    }

    pub fn entities(&self, pane: &PaneId) -> &[Entity] {
        self.panes
            .get(pane)
            .map(|state| state.entities.as_slice())
            .unwrap_or(&[])
    }

    pub fn panes_of<'a>(
        &'a self,
        layer: &'a LayerId,
    ) -> impl Iterator<Item = (&'a PaneId, &'a PaneState)> {
        self.panes.iter().filter(move |(id, _)| &id.layer == layer)
    }

    pub fn entity_count(&self, layer: &LayerId) -> usize {
        self.panes_of(layer)
            .map(|(_, state)| state.entities.len())
            .sum()
    }

    pub fn count(&self, layer: &LayerId) -> Option<usize> {
        self.counts.get(layer).copied()
    }

    pub fn center(&self) -> Option<(LatLng, f64)> {
        self.center
    }

    pub fn pane_count(&self) -> usize {
        self.panes.len()
    }
}

impl RenderSurface for HeadlessSurface {
    fn create_layer(&mut self, pane: &PaneId) {
        self.panes.entry(pane.clone()).or_default();
    }

    fn remove_layer(&mut self, pane: &PaneId) {
        self.panes.remove(pane);
        if !self.panes.keys().any(|id| id.layer == pane.layer) {
            self.counts.remove(&pane.layer);
        }
    }

    fn set_entities(&mut self, pane: &PaneId, entities: Vec<Entity>) {
        self.panes.entry(pane.clone()).or_default().entities = entities;
    }

    fn add_entity(&mut self, pane: &PaneId, entity: Entity) {
        let state = self.panes.entry(pane.clone()).or_default();
        match state.entities.iter_mut().find(|e| e.key == entity.key) {
            Some(existing) => *existing = entity,
            None => state.entities.push(entity),
        }
    }

    fn remove_entity(&mut self, pane: &PaneId, key: &str) {
        if let Some(state) = self.panes.get_mut(pane) {
            state.entities.retain(|entity| entity.key != key);
        }
    }

    fn set_opacity(&mut self, pane: &PaneId, opacity: f32) {
        self.panes.entry(pane.clone()).or_default().opacity = opacity;
    }

    fn set_visible(&mut self, pane: &PaneId, visible: bool) {
        self.panes.entry(pane.clone()).or_default().visible = visible;
    }

    fn recenter(&mut self, origin: LatLng, bounds_radius_m: f64) {
        self.center = Some((origin, bounds_radius_m));
    }

    fn set_count(&mut self, layer: &LayerId, count: usize) {
        self.counts.insert(layer.clone(), count);
    }
}
