//! The console session: one broker connection, one render surface, one model.
//!
//! Everything runs on the caller's thread. Front-ends call [`Console::tick`]
//! on a fixed cadence; it routes whatever the broker delivered, runs due poll
//! tasks and executes a pending reload.

mod router;

use std::sync::Arc;

use console_proto::{
    ChainId, ChainSetup, ControlEdit, ControlId, GeoOrigin, LayerId, PublishOptions,
    SelectedChain, SubSystemId, SubSystemPath, Topic, TopicFilter,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::broker::{BrokerTransport, TransportError};
use crate::config::{BrokerConfig, ConsoleConfig, TileServer};
use crate::gateway::{publish_plan, settings_plan};
use crate::layers::{LayerRegistry, LayerSummary, PollTask};
use crate::model::{LayerKind, LayerRecord, ModelStore};
use crate::preferences::PreferenceCache;
use crate::render::{OpacityLevel, RenderSurface};
use crate::scheduler::{Clock, PollScheduler};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no chain is selected")]
    NoSelection,
    #[error("chain {0} is not known")]
    UnknownChain(ChainId),
    #[error("subsystem {0} is not bound")]
    UnboundSubSystem(SubSystemPath),
    #[error("control {control} of {path} does not accept that edit")]
    RejectedEdit {
        path: SubSystemPath,
        control: ControlId,
    },
}

/// How far discovery has progressed in this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Subscribed to the chain list only.
    Discovering,
    ChainSelected,
    SubsystemsBound,
}

pub struct Console<B, R> {
    config: Arc<ConsoleConfig>,
    clock: Arc<dyn Clock>,
    broker: B,
    surface: R,
    model: ModelStore,
    layers: LayerRegistry,
    preferences: PreferenceCache,
    scheduler: PollScheduler<PollTask>,
    phase: Phase,
    subscriptions: Vec<TopicFilter>,
    pending_reload: Option<u64>,
    reloads: usize,
    broker_settings: BrokerConfig,
}

impl<B: BrokerTransport, R: RenderSurface> Console<B, R> {
    pub fn new(
        config: Arc<ConsoleConfig>,
        broker: B,
        surface: R,
        preferences: PreferenceCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let broker_settings = preferences
            .broker()
            .unwrap_or_else(|| config.broker.clone());
        Self {
            config,
            clock,
            broker,
            surface,
            model: ModelStore::new(),
            layers: LayerRegistry::new(),
            preferences,
            scheduler: PollScheduler::new(),
            phase: Phase::Discovering,
            subscriptions: Vec::new(),
            pending_reload: None,
            reloads: 0,
            broker_settings,
        }
    }

    /// Draw the base map and enter discovery.
    pub fn start(&mut self) {
        self.layers
            .ensure_tiles(&self.config.tiles, &mut self.preferences, &mut self.surface);
        self.enter_discovery();
        self.pump();
    }

    fn enter_discovery(&mut self) {
        self.phase = Phase::Discovering;
        let now = self.now();
        self.scheduler.schedule(
            now,
            self.config.timing.status_refresh_interval_ms,
            PollTask::StatusSweep,
        );
        self.subscribe(TopicFilter::exact(&Topic::AvailableChains));
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Route every message the broker has delivered, including the cascade
    /// those messages trigger. Returns how many were routed.
    pub fn pump(&mut self) -> usize {
        let mut routed = 0;
        loop {
            let batch = self.broker.drain_inbound();
            if batch.is_empty() {
                return routed;
            }
            for message in &batch {
                self.route(message);
            }
            routed += batch.len();
        }
    }

    /// One cooperative step: inbound messages, due timers, pending reload.
    pub fn tick(&mut self) {
        self.pump();
        let now = self.now();
        for (handle, task) in self.scheduler.take_due(now) {
            if !self.scheduler.is_active(handle) {
                continue;
            }
            match task {
                PollTask::Store { layer, task } => {
                    self.layers.run(&layer, task, &mut self.surface, now)
                }
                PollTask::StatusSweep => self.sweep_heartbeats(now),
            }
        }
        if self.pending_reload.is_some_and(|due| due <= now) {
            self.reload();
        }
        self.pump();
    }

    fn sweep_heartbeats(&mut self, now: u64) {
        let expired = self
            .model
            .sweep_heartbeats(now, self.config.timing.status_timeout_ms);
        for sub in expired {
            info!(
                target: "sensor_console::router",
                subsystem = %sub,
                "subsystem.heartbeat=lost"
            );
        }
    }

    /// Subscribe once per filter; the filter is remembered for reconnects.
    fn subscribe(&mut self, filter: TopicFilter) {
        if self.subscriptions.contains(&filter) {
            return;
        }
        match self.broker.subscribe(&filter) {
            Ok(()) => debug!(
                target: "sensor_console::router",
                filter = %filter,
                "router.subscribed"
            ),
            Err(err) => warn!(
                target: "sensor_console::router",
                filter = %filter,
                error = %err,
                "router.subscribe_failed"
            ),
        }
        self.subscriptions.push(filter);
    }

    fn unsubscribe(&mut self, filter: &TopicFilter) {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|existing| existing != filter);
        if self.subscriptions.len() == before {
            return;
        }
        match self.broker.unsubscribe(filter) {
            Ok(()) => debug!(
                target: "sensor_console::router",
                filter = %filter,
                "router.unsubscribed"
            ),
            Err(err) => warn!(
                target: "sensor_console::router",
                filter = %filter,
                error = %err,
                "router.unsubscribe_failed"
            ),
        }
    }

    /// Drop the filters owned by a subsystem path and by the stream
    /// layers torn down with it.
    fn release_subsystem(&mut self, path: &SubSystemPath, layers: &[LayerId]) {
        let owned = [
            TopicFilter::exact(&Topic::Outgoing(path.clone())),
            TopicFilter::exact(&Topic::Incoming(path.clone())),
            TopicFilter::exact(&Topic::Rates(path.clone())),
            TopicFilter::controls(path),
            TopicFilter::interpretations(path),
        ];
        for filter in &owned {
            self.unsubscribe(filter);
        }
        for layer in layers {
            let LayerId::Stream(id) = layer else {
                continue;
            };
            if id.chain != path.chain || id.subsystem != path.subsystem {
                continue;
            }
            self.unsubscribe(&TopicFilter::exact(&Topic::Records {
                path: path.clone(),
                stream: id.stream.clone(),
            }));
        }
    }

    fn unsubscribe_all(&mut self) {
        self.subscriptions.clear();
        if let Err(err) = self.broker.unsubscribe_all() {
            warn!(
                target: "sensor_console::router",
                error = %err,
                "router.unsubscribe_failed"
            );
        }
    }

    /// Re-issue every live subscription after a transport reconnect.
    pub fn resubscribe(&mut self) {
        let filters = std::mem::take(&mut self.subscriptions);
        info!(
            target: "sensor_console::router",
            count = filters.len(),
            "router.resubscribe"
        );
        for filter in filters {
            self.subscribe(filter);
        }
    }

    /// Arm a full resync; a reload already pending is not re-armed.
    pub(crate) fn schedule_reload(&mut self, reason: &'static str) {
        if self.pending_reload.is_some() {
            return;
        }
        let due = self.now() + self.config.timing.reload_delay_ms;
        info!(
            target: "sensor_console::router",
            reason,
            due_ms = due,
            "session.reload_scheduled"
        );
        self.pending_reload = Some(due);
    }

    /// Tear down every layer, timer and subscription and rediscover.
    pub fn reload(&mut self) {
        self.layers.dispose_all(&mut self.scheduler, &mut self.surface);
        self.scheduler.clear();
        self.model.clear();
        self.unsubscribe_all();
        self.pending_reload = None;
        self.reloads += 1;
        info!(
            target: "sensor_console::router",
            reloads = self.reloads,
            "session.reloaded"
        );
        self.enter_discovery();
    }

    /// Drop local edits and rebuild from retained broker state.
    pub fn undo_changes(&mut self) {
        self.model.clear_selection();
        info!(target: "sensor_console::router", "session.undo");
        self.reload();
        self.pump();
    }

    /// Publish the full configuration and schedule a reload.
    pub fn save_settings(&mut self) -> Result<usize, ConsoleError> {
        self.unsubscribe_all();
        self.preferences.flush();
        let plan = settings_plan(&self.model)?;
        let published = publish_plan(&mut self.broker, &plan)?;
        self.model.clear_purge_queues();
        self.preferences.put_broker(&self.broker_settings);
        self.schedule_reload("save");
        Ok(published)
    }

    // chains

    /// Register a fresh chain with an empty setup and select it when nothing
    /// else is selected.
    pub fn add_chain(&mut self) -> ChainId {
        let id = ChainId::generate();
        self.model.add_chain(id.clone());
        self.model.register_layer(
            LayerId::Rosette(id.clone()),
            LayerRecord {
                kind: LayerKind::Rosette,
                interpretation: None,
            },
        );
        if self.model.selected().is_none() {
            self.model.select(id.clone());
        }
        info!(target: "sensor_console::router", chain = %id, "chain.added");
        id
    }

    pub fn remove_chain(&mut self, id: &ChainId) -> Result<(), ConsoleError> {
        if self.model.chain(id).is_none() {
            return Err(ConsoleError::UnknownChain(id.clone()));
        }
        let was_selected = self.model.is_selected(id);
        let paths: Vec<SubSystemPath> = self
            .model
            .bound(id)
            .iter()
            .map(|sub| SubSystemPath::new(id.clone(), sub.id.clone()))
            .collect();
        let removed = self.model.remove_chain(id);
        for layer in &removed {
            self.layers
                .dispose(layer, &mut self.scheduler, &mut self.surface);
        }
        for path in &paths {
            self.release_subsystem(path, &removed);
        }
        self.unsubscribe(&TopicFilter::chain_setup_tree(id));
        self.layers.dispose(
            &LayerId::Rosette(id.clone()),
            &mut self.scheduler,
            &mut self.surface,
        );
        if self.model.available_chains().is_empty() {
            self.add_chain();
        }
        if self.model.available_chains().len() <= 1 || was_selected {
            if let Some(first) = self.model.available_chains().first().cloned() {
                self.model.select(first);
            }
        }
        info!(target: "sensor_console::router", chain = %id, "chain.removed");
        Ok(())
    }

    pub fn select_chain(&mut self, id: &ChainId) -> Result<(), ConsoleError> {
        if self.model.chain(id).is_none() {
            return Err(ConsoleError::UnknownChain(id.clone()));
        }
        self.model.select(id.clone());
        Ok(())
    }

    pub fn set_chain_setup(
        &mut self,
        id: &ChainId,
        label: &str,
        origin: GeoOrigin,
        range_m: f64,
    ) -> Result<(), ConsoleError> {
        if self.model.chain(id).is_none() {
            return Err(ConsoleError::UnknownChain(id.clone()));
        }
        let setup = ChainSetup {
            label: label.to_string(),
            origin,
            range: range_m,
        };
        self.model.apply_setup(id, &setup);
        if self.model.is_selected(id) {
            self.show_chain(id);
        }
        Ok(())
    }

    /// Recenter on the chain and rebuild its rosette.
    fn show_chain(&mut self, id: &ChainId) {
        let Some(chain) = self.model.chain(id) else {
            return;
        };
        let (origin, range) = (chain.origin(), chain.range_m);
        if origin.is_finite() {
            self.surface.recenter(origin, range);
        }
        self.layers.draw_rosette(
            id,
            origin,
            range,
            &mut self.preferences,
            &mut self.surface,
        );
    }

    /// Flip the selected chain's running flag and announce it immediately.
    pub fn toggle_running(&mut self) -> Result<bool, ConsoleError> {
        let id = self.model.selected().cloned().ok_or(ConsoleError::NoSelection)?;
        let chain = self
            .model
            .chain_mut(&id)
            .ok_or_else(|| ConsoleError::UnknownChain(id.clone()))?;
        chain.is_running = !chain.is_running;
        let message = SelectedChain {
            id: id.clone(),
            is_running: chain.is_running,
        };
        let payload = serde_json::to_vec(&message)?;
        self.broker.publish(
            &Topic::SelectedChain.to_string(),
            &payload,
            PublishOptions::default(),
        )?;
        info!(
            target: "sensor_console::router",
            chain = %id,
            running = message.is_running,
            "chain.running_toggled"
        );
        Ok(message.is_running)
    }

    // subsystems

    /// Append `sub` to the selected chain with the default endpoint.
    /// Returns `false` when it is already bound there.
    pub fn add_subsystem_to_chain(&mut self, sub: &SubSystemId) -> Result<bool, ConsoleError> {
        let chain = self.model.selected().cloned().ok_or(ConsoleError::NoSelection)?;
        if !self.model.bind_subsystem(&chain, sub) {
            return Ok(false);
        }
        self.model
            .apply_default_endpoint(&SubSystemPath::new(chain.clone(), sub.clone()));
        info!(
            target: "sensor_console::router",
            chain = %chain,
            subsystem = %sub,
            "subsystem.added"
        );
        Ok(true)
    }

    pub fn remove_subsystem(&mut self, path: &SubSystemPath) -> Result<(), ConsoleError> {
        self.model
            .unbind_subsystem(&path.chain, &path.subsystem)
            .ok_or_else(|| ConsoleError::UnboundSubSystem(path.clone()))?;
        let removed = self.model.remove_subsystem_layers(path);
        for layer in &removed {
            self.layers
                .dispose(layer, &mut self.scheduler, &mut self.surface);
        }
        self.release_subsystem(path, &removed);
        info!(target: "sensor_console::router", path = %path, "subsystem.removed");
        Ok(())
    }

    pub fn move_subsystem_up(&mut self, path: &SubSystemPath) -> bool {
        self.model.move_subsystem(&path.chain, &path.subsystem, true)
    }

    pub fn move_subsystem_down(&mut self, path: &SubSystemPath) -> bool {
        self.model.move_subsystem(&path.chain, &path.subsystem, false)
    }

    /// Apply an operator edit and republish the whole control.
    pub fn set_control_value(
        &mut self,
        path: &SubSystemPath,
        control: &ControlId,
        edit: &ControlEdit,
    ) -> Result<(), ConsoleError> {
        let rejected = || ConsoleError::RejectedEdit {
            path: path.clone(),
            control: control.clone(),
        };
        let target = self.model.control_mut(path, control).ok_or_else(rejected)?;
        if !target.apply(edit) {
            return Err(rejected());
        }
        let payload = serde_json::to_vec(target)?;
        let topic = Topic::Control {
            path: path.clone(),
            control: control.clone(),
        };
        self.broker
            .publish(&topic.to_string(), &payload, PublishOptions::default())?;
        Ok(())
    }

    // layers

    pub fn set_layer_opacity(&mut self, layer: &LayerId, level: OpacityLevel) {
        self.preferences.set_opacity(layer, level);
        self.layers.set_opacity(layer, level, &mut self.surface);
    }

    pub fn set_layer_visibility(&mut self, layer: &LayerId, visible: bool) {
        self.preferences.set_visible(layer, visible);
        self.layers.set_visible(layer, visible, &mut self.surface);
    }

    pub fn set_tile_mode(&mut self, day_mode: bool, server: TileServer) {
        self.layers.set_tile_mode(&mut self.surface, day_mode, server);
    }

    pub fn layer_summaries(&mut self) -> Vec<LayerSummary> {
        self.layers.summaries(&mut self.preferences)
    }

    // session state

    pub fn broker_settings(&self) -> &BrokerConfig {
        &self.broker_settings
    }

    /// Takes effect on the next save.
    pub fn set_broker_settings(&mut self, settings: BrokerConfig) {
        self.broker_settings = settings;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn model(&self) -> &ModelStore {
        &self.model
    }

    pub fn layers(&self) -> &LayerRegistry {
        &self.layers
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn subscriptions(&self) -> &[TopicFilter] {
        &self.subscriptions
    }

    pub fn pending_reload(&self) -> Option<u64> {
        self.pending_reload
    }

    pub fn reload_count(&self) -> usize {
        self.reloads
    }

    /// Live poll timers, the heartbeat sweep included.
    pub fn timer_count(&self) -> usize {
        self.scheduler.len()
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    pub fn surface(&self) -> &R {
        &self.surface
    }
}
