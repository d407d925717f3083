//! In-memory model of chains, subsystems and layers.
//!
//! All keys are typed ids. The router is the only writer; the gateway and
//! front-ends read.

use std::collections::{BTreeMap, HashMap};

use console_proto::{
    ChainId, ChainSetup, Control, ControlId, Definition, DisplayType, Endpoint, GeoOrigin,
    Interpretation, LayerId, StreamKey, SubSystemId, SubSystemPath, SubSystemState, Topic,
    EMPTY_RATE_MASK,
};
use serde_json::Value;

use crate::geo::LatLng;

/// Default outgoing endpoint of a subsystem added to a chain by hand.
pub const DEFAULT_PROTOCOL: &str = "MQTT";
pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1883;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainRecord {
    pub id: ChainId,
    pub label: String,
    pub origin: GeoOrigin,
    pub range_m: f64,
    pub is_running: bool,
    pub state: SubSystemState,
    pub enabled: bool,
}

impl ChainRecord {
    pub fn new(id: ChainId) -> Self {
        Self {
            id,
            label: String::new(),
            origin: GeoOrigin::default(),
            range_m: 0.0,
            is_running: false,
            state: SubSystemState::Unknown,
            enabled: false,
        }
    }

    pub fn origin(&self) -> LatLng {
        LatLng::from(self.origin)
    }

    pub fn setup(&self) -> ChainSetup {
        ChainSetup {
            label: self.label.clone(),
            origin: self.origin,
            range: self.range_m,
        }
    }
}

/// A subsystem announced on `AvailableSubSystems/{id}/...`, bound or not.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailableSubSystem {
    pub label: String,
    pub streams: Vec<StreamKey>,
    pub state: SubSystemState,
    pub last_seen_ms: Option<u64>,
    pub rate_mask: String,
}

impl Default for AvailableSubSystem {
    fn default() -> Self {
        Self {
            label: String::new(),
            streams: Vec::new(),
            state: SubSystemState::Unknown,
            last_seen_ms: None,
            rate_mask: EMPTY_RATE_MASK.to_string(),
        }
    }
}

impl AvailableSubSystem {
    pub fn is_broadcasting(&self) -> bool {
        self.state != SubSystemState::Unknown
    }
}

/// Cached knowledge about one output stream of a bound subsystem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataStream {
    pub layout: Option<Value>,
    pub incoming: Option<Endpoint>,
}

/// A subsystem occupying one position in a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSubSystem {
    pub id: SubSystemId,
    pub endpoint: Endpoint,
    pub data_streams: BTreeMap<String, DataStream>,
    pub controls: BTreeMap<ControlId, Control>,
    pub added_locally: bool,
}

impl BoundSubSystem {
    pub fn new(id: SubSystemId) -> Self {
        Self {
            id,
            endpoint: Endpoint::default(),
            data_streams: BTreeMap::new(),
            controls: BTreeMap::new(),
            added_locally: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    WorldMap,
    Rosette,
    Data(DisplayType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerRecord {
    pub kind: LayerKind,
    pub interpretation: Option<Interpretation>,
}

/// Where the lines of one `.../Records` topic go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRoute {
    pub layer: LayerId,
    pub display: DisplayType,
}

#[derive(Debug, Default)]
pub struct ModelStore {
    available_chains: Vec<ChainId>,
    chains: HashMap<ChainId, ChainRecord>,
    selected: Option<ChainId>,
    available_subsystems: BTreeMap<SubSystemId, AvailableSubSystem>,
    bound: HashMap<ChainId, Vec<BoundSubSystem>>,
    layers: BTreeMap<LayerId, LayerRecord>,
    routes: HashMap<String, RecordRoute>,
    purged_topics: Vec<String>,
    purged_chains: Vec<ChainId>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    // chains

    pub fn available_chains(&self) -> &[ChainId] {
        &self.available_chains
    }

    /// Replace the chain list. Chains removed locally and not yet cleared
    /// upstream stay out of it.
    pub fn set_available_chains(&mut self, chains: Vec<ChainId>) {
        let mut seen = Vec::with_capacity(chains.len());
        for chain in chains {
            if !seen.contains(&chain) && !self.purged_chains.contains(&chain) {
                seen.push(chain);
            }
        }
        self.available_chains = seen;
    }

    pub fn chain(&self, id: &ChainId) -> Option<&ChainRecord> {
        self.chains.get(id)
    }

    pub fn chain_mut(&mut self, id: &ChainId) -> Option<&mut ChainRecord> {
        self.chains.get_mut(id)
    }

    /// Chains in available-list order.
    pub fn chains(&self) -> impl Iterator<Item = &ChainRecord> {
        self.available_chains
            .iter()
            .filter_map(|id| self.chains.get(id))
    }

    pub fn ensure_chain(&mut self, id: &ChainId) -> &mut ChainRecord {
        self.chains
            .entry(id.clone())
            .or_insert_with(|| ChainRecord::new(id.clone()))
    }

    /// Apply a `Setup` payload. Returns `true` when anything changed.
    pub fn apply_setup(&mut self, id: &ChainId, setup: &ChainSetup) -> bool {
        let chain = self.ensure_chain(id);
        let changed = chain.label != setup.label
            || chain.origin != setup.origin
            || chain.range_m.to_bits() != setup.range.to_bits();
        chain.label = setup.label.clone();
        chain.origin = setup.origin;
        chain.range_m = setup.range;
        changed
    }

    /// Register a locally created chain.
    pub fn add_chain(&mut self, id: ChainId) {
        self.ensure_chain(&id);
        if !self.available_chains.contains(&id) {
            self.available_chains.push(id);
        }
    }

    /// Drop a chain with everything bound to it. Its topics and those of its
    /// subsystems are queued for clearing. Returns the layers it owned.
    pub fn remove_chain(&mut self, id: &ChainId) -> Vec<LayerId> {
        self.available_chains.retain(|chain| chain != id);
        self.chains.remove(id);
        let bound: Vec<SubSystemId> = self
            .bound(id)
            .iter()
            .map(|sub| sub.id.clone())
            .collect();
        for sub in bound {
            self.unbind_subsystem(id, &sub);
        }
        self.bound.remove(id);
        if !self.purged_chains.contains(id) {
            self.purged_chains.push(id.clone());
        }
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.remove_layers(|layer| layer.chain() == Some(id))
    }

    pub fn selected(&self) -> Option<&ChainId> {
        self.selected.as_ref()
    }

    pub fn is_selected(&self, id: &ChainId) -> bool {
        self.selected.as_ref() == Some(id)
    }

    pub fn select(&mut self, id: ChainId) {
        self.ensure_chain(&id);
        self.selected = Some(id);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    // subsystems

    pub fn available_subsystems(
        &self,
    ) -> impl Iterator<Item = (&SubSystemId, &AvailableSubSystem)> {
        self.available_subsystems.iter()
    }

    pub fn available_subsystem(&self, id: &SubSystemId) -> Option<&AvailableSubSystem> {
        self.available_subsystems.get(id)
    }

    fn available_entry(&mut self, id: &SubSystemId) -> &mut AvailableSubSystem {
        self.available_subsystems.entry(id.clone()).or_default()
    }

    /// Record a heartbeat and re-roll every chain state.
    pub fn record_status(&mut self, id: &SubSystemId, state: SubSystemState, now: u64) {
        let entry = self.available_entry(id);
        entry.state = state;
        entry.last_seen_ms = Some(now);
        self.roll_up_states();
    }

    /// Revert subsystems silent for longer than `timeout_ms` to `Unknown`.
    pub fn sweep_heartbeats(&mut self, now: u64, timeout_ms: u64) -> Vec<SubSystemId> {
        let mut expired = Vec::new();
        for (id, sub) in &mut self.available_subsystems {
            let silent = sub
                .last_seen_ms
                .map_or(true, |seen| now.saturating_sub(seen) > timeout_ms);
            if silent && sub.state != SubSystemState::Unknown {
                sub.state = SubSystemState::Unknown;
                sub.rate_mask = EMPTY_RATE_MASK.to_string();
                expired.push(id.clone());
            }
        }
        if !expired.is_empty() {
            self.roll_up_states();
        }
        expired
    }

    pub fn apply_definition(&mut self, id: &SubSystemId, definition: &Definition) {
        let entry = self.available_entry(id);
        entry.label = definition.label.clone();
        entry.streams = definition.streams.clone();
    }

    pub fn set_rate_mask(&mut self, id: &SubSystemId, mask: &str) {
        self.available_entry(id).rate_mask = mask.to_string();
    }

    pub fn bound(&self, chain: &ChainId) -> &[BoundSubSystem] {
        self.bound.get(chain).map_or(&[], Vec::as_slice)
    }

    pub fn bound_subsystem(&self, path: &SubSystemPath) -> Option<&BoundSubSystem> {
        self.bound(&path.chain)
            .iter()
            .find(|sub| sub.id == path.subsystem)
    }

    pub fn bound_subsystem_mut(&mut self, path: &SubSystemPath) -> Option<&mut BoundSubSystem> {
        self.bound
            .get_mut(&path.chain)?
            .iter_mut()
            .find(|sub| sub.id == path.subsystem)
    }

    pub fn is_bound(&self, path: &SubSystemPath) -> bool {
        self.bound_subsystem(path).is_some()
    }

    /// Unbound here while its retained topics still await clearing.
    pub fn is_unbound_locally(&self, path: &SubSystemPath) -> bool {
        !self.is_bound(path)
            && self
                .purged_topics
                .contains(&Topic::Outgoing(path.clone()).to_string())
    }

    /// Append `sub` to the end of `chain`. Returns `false` when already bound.
    pub fn bind_subsystem(&mut self, chain: &ChainId, sub: &SubSystemId) -> bool {
        self.ensure_chain(chain);
        self.available_entry(sub);
        let bound = self.bound.entry(chain.clone()).or_default();
        if bound.iter().any(|existing| &existing.id == sub) {
            return false;
        }
        bound.push(BoundSubSystem::new(sub.clone()));
        self.roll_up_states();
        true
    }

    /// Unbind `sub`, queueing its published topics for clearing.
    pub fn unbind_subsystem(
        &mut self,
        chain: &ChainId,
        sub: &SubSystemId,
    ) -> Option<BoundSubSystem> {
        let bound = self.bound.get_mut(chain)?;
        let index = bound.iter().position(|existing| &existing.id == sub)?;
        let removed = bound.remove(index);
        let path = SubSystemPath::new(chain.clone(), sub.clone());
        for control in removed.controls.keys() {
            self.purge(Topic::Control {
                path: path.clone(),
                control: control.clone(),
            });
        }
        for stream in removed.data_streams.keys() {
            if let Ok(stream) = StreamKey::parse(stream) {
                self.purge(Topic::Interpretation {
                    path: path.clone(),
                    stream,
                });
            }
        }
        self.purge(Topic::Incoming(path.clone()));
        self.purge(Topic::Outgoing(path));
        self.roll_up_states();
        Some(removed)
    }

    fn purge(&mut self, topic: Topic) {
        let topic = topic.to_string();
        if !self.purged_topics.contains(&topic) {
            self.purged_topics.push(topic);
        }
    }

    /// Swap `sub` with its neighbour; `up` moves it towards the chain head.
    pub fn move_subsystem(&mut self, chain: &ChainId, sub: &SubSystemId, up: bool) -> bool {
        let Some(bound) = self.bound.get_mut(chain) else {
            return false;
        };
        let Some(index) = bound.iter().position(|existing| &existing.id == sub) else {
            return false;
        };
        let target = if up {
            index.saturating_sub(1)
        } else {
            (index + 1).min(bound.len() - 1)
        };
        if target == index {
            return false;
        }
        bound.swap(index, target);
        true
    }

    /// Give a locally added subsystem its default outgoing endpoint.
    pub fn apply_default_endpoint(&mut self, path: &SubSystemPath) {
        let streams: Vec<String> = self
            .available_subsystem(&path.subsystem)
            .map(|sub| sub.streams.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        if let Some(sub) = self.bound_subsystem_mut(path) {
            sub.added_locally = true;
            sub.endpoint = Endpoint {
                protocol: DEFAULT_PROTOCOL.to_string(),
                ip: DEFAULT_IP.to_string(),
                port: DEFAULT_PORT,
                topics: streams,
                ..Endpoint::default()
            };
        }
    }

    pub fn set_endpoint(&mut self, path: &SubSystemPath, endpoint: Endpoint) -> bool {
        match self.bound_subsystem_mut(path) {
            Some(sub) => {
                sub.endpoint = endpoint;
                true
            }
            None => false,
        }
    }

    /// Accept an `Incoming` endpoint: the source subsystem's selected stream
    /// becomes the first listed topic, and when the source offers that stream
    /// the endpoint is cached on the destination's stream entry.
    pub fn accept_incoming(&mut self, path: &SubSystemPath, incoming: Endpoint) -> bool {
        let Some(source) = incoming.source.clone() else {
            return false;
        };
        let Some(stream) = incoming.topics.first().cloned() else {
            return false;
        };
        let source_path = SubSystemPath::new(path.chain.clone(), source);
        let offered = match self.bound_subsystem_mut(&source_path) {
            Some(source) => {
                source.endpoint.selected_topic = Some(stream.clone());
                source.endpoint.topics.contains(&stream)
            }
            None => return false,
        };
        if offered {
            if let Some(sub) = self.bound_subsystem_mut(path) {
                sub.data_streams.entry(stream).or_default().incoming = Some(incoming);
            }
        }
        true
    }

    pub fn upsert_control(
        &mut self,
        path: &SubSystemPath,
        id: ControlId,
        control: Control,
    ) -> bool {
        match self.bound_subsystem_mut(path) {
            Some(sub) => {
                sub.controls.insert(id, control);
                true
            }
            None => false,
        }
    }

    pub fn control_mut(&mut self, path: &SubSystemPath, id: &ControlId) -> Option<&mut Control> {
        self.bound_subsystem_mut(path)?.controls.get_mut(id)
    }

    pub fn cache_layout(&mut self, path: &SubSystemPath, stream: &str, layout: Option<Value>) {
        if let Some(sub) = self.bound_subsystem_mut(path) {
            sub.data_streams.entry(stream.to_string()).or_default().layout = layout;
        }
    }

    /// Recompute every chain's aggregate state and enabled flag.
    pub fn roll_up_states(&mut self) {
        for (chain_id, chain) in &mut self.chains {
            let states: Vec<SubSystemState> = self
                .bound
                .get(chain_id)
                .map(|bound| {
                    bound
                        .iter()
                        .map(|sub| {
                            self.available_subsystems
                                .get(&sub.id)
                                .map_or(SubSystemState::Unknown, |a| a.state)
                        })
                        .collect()
                })
                .unwrap_or_default();
            chain.state = SubSystemState::rollup(states.iter().copied());
            chain.enabled = states.iter().any(|state| *state != SubSystemState::Unknown);
        }
    }

    // layers

    pub fn layers(&self) -> impl Iterator<Item = (&LayerId, &LayerRecord)> {
        self.layers.iter()
    }

    pub fn layer(&self, id: &LayerId) -> Option<&LayerRecord> {
        self.layers.get(id)
    }

    pub fn register_layer(&mut self, id: LayerId, record: LayerRecord) -> bool {
        if self.layers.contains_key(&id) {
            return false;
        }
        self.layers.insert(id, record);
        true
    }

    fn remove_layers(&mut self, predicate: impl Fn(&LayerId) -> bool) -> Vec<LayerId> {
        let doomed: Vec<LayerId> = self
            .layers
            .keys()
            .filter(|id| predicate(id))
            .cloned()
            .collect();
        for id in &doomed {
            self.layers.remove(id);
        }
        self.routes.retain(|_, route| !doomed.contains(&route.layer));
        doomed
    }

    pub fn remove_subsystem_layers(&mut self, path: &SubSystemPath) -> Vec<LayerId> {
        self.remove_layers(|layer| {
            layer.chain() == Some(&path.chain) && layer.subsystem() == Some(&path.subsystem)
        })
    }

    pub fn set_route(&mut self, records_topic: String, route: RecordRoute) {
        self.routes.insert(records_topic, route);
    }

    pub fn route(&self, records_topic: &str) -> Option<&RecordRoute> {
        self.routes.get(records_topic)
    }

    // purge queues

    pub fn purged_topics(&self) -> &[String] {
        &self.purged_topics
    }

    pub fn purged_chains(&self) -> &[ChainId] {
        &self.purged_chains
    }

    pub fn clear_purge_queues(&mut self) {
        self.purged_topics.clear();
        self.purged_chains.clear();
    }

    /// Forget everything, as on a reload.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
