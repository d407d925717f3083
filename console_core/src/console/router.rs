//! Topic dispatch: turns each inbound message into model updates and the
//! subscriptions they cascade into.
//!
//! Malformed payloads are dropped here and never reach the caller.

use console_proto::{
    decode_json, decode_text, iso8601_millis, ChainId, ChainSetup, Control, ControlId, Definition,
    Endpoint, Interpretation, LayerId, RateReport, SelectedChain, StreamKey, SubSystemId,
    SubSystemPath, SubSystemState, Topic, TopicFilter,
};
use tracing::{debug, info, trace, warn};

use super::{Console, Phase};
use crate::broker::{BrokerTransport, InboundMessage};
use crate::model::{LayerKind, LayerRecord, RecordRoute};
use crate::render::RenderSurface;
use crate::schema::RecordSchema;
use crate::stores::{build_store, StoreInit};

impl<B: BrokerTransport, R: RenderSurface> Console<B, R> {
    /// Route one inbound message. Never fails; rejected messages are logged.
    pub fn route(&mut self, message: &InboundMessage) {
        let topic = match Topic::parse(&message.topic) {
            Ok(topic) => topic,
            Err(err) => {
                debug!(
                    target: "sensor_console::router",
                    topic = %message.topic,
                    error = %err,
                    "router.drop=topic"
                );
                return;
            }
        };
        let payload = message.payload.as_slice();
        match topic {
            Topic::AvailableChains => self.on_available_chains(payload),
            Topic::SelectedChain => self.on_selected_chain(payload),
            Topic::ChainSetup(chain) => self.on_chain_setup(&chain, payload),
            Topic::ChainSubSystems(chain) => self.on_chain_subsystems(&chain, payload),
            Topic::SubSystemStatus(sub) => self.on_status(&sub, payload),
            Topic::SubSystemDefinition(sub) => self.on_definition(&sub, payload),
            Topic::Outgoing(path) => self.on_outgoing(&path, payload),
            Topic::Incoming(path) => self.on_incoming(&path, payload),
            Topic::Rates(path) => self.on_rates(&path, payload),
            Topic::Control { path, control } => self.on_control(&path, &control, payload),
            Topic::Interpretation { path, stream } => {
                self.on_interpretation(&path, &stream, payload)
            }
            Topic::Records { path, .. } => self.on_records(&path, &message.topic, payload),
        }
    }

    fn on_available_chains(&mut self, payload: &[u8]) {
        let chains: Vec<ChainId> = match decode_json(payload) {
            Ok(chains) => chains,
            Err(err) => return drop_payload("AvailableChains", &err),
        };
        self.model.set_available_chains(chains);
        self.subscribe(TopicFilter::exact(&Topic::SelectedChain));
        if self.phase != Phase::Discovering {
            self.subscribe_setup_trees();
        }
    }

    fn subscribe_setup_trees(&mut self) {
        let chains = self.model.available_chains().to_vec();
        for chain in &chains {
            self.subscribe(TopicFilter::chain_setup_tree(chain));
        }
    }

    fn on_selected_chain(&mut self, payload: &[u8]) {
        let message: SelectedChain = match decode_json(payload) {
            Ok(message) => message,
            Err(err) => return drop_payload("SelectedChain", &err),
        };
        match self.model.selected().cloned() {
            Some(active) if active != message.id => {
                info!(
                    target: "sensor_console::router",
                    active = %active,
                    selected = %message.id,
                    "chain.reselected"
                );
                self.schedule_reload("chain_switch");
                return;
            }
            Some(_) => {}
            None => {
                self.model.select(message.id.clone());
                self.phase = Phase::ChainSelected;
                info!(
                    target: "sensor_console::router",
                    chain = %message.id,
                    "chain.selected"
                );
            }
        }
        if let Some(chain) = self.model.chain_mut(&message.id) {
            chain.is_running = message.is_running;
        }
        self.subscribe(TopicFilter::all_statuses());
        self.subscribe(TopicFilter::all_definitions());
        self.subscribe_setup_trees();
    }

    fn on_chain_setup(&mut self, chain: &ChainId, payload: &[u8]) {
        let setup: ChainSetup = match decode_json(payload) {
            Ok(setup) => setup,
            Err(err) => {
                // an emptied Setup means the chain was deleted upstream
                debug!(
                    target: "sensor_console::router",
                    chain = %chain,
                    error = %err,
                    "router.drop=setup"
                );
                return;
            }
        };
        let changed = self.model.apply_setup(chain, &setup);
        self.model.register_layer(
            LayerId::Rosette(chain.clone()),
            LayerRecord {
                kind: LayerKind::Rosette,
                interpretation: None,
            },
        );
        if self.model.is_selected(chain) {
            self.show_chain(chain);
        }
        debug!(
            target: "sensor_console::router",
            chain = %chain,
            changed,
            "chain.setup"
        );
    }

    fn on_chain_subsystems(&mut self, chain: &ChainId, payload: &[u8]) {
        let subsystems: Vec<SubSystemId> = match decode_json(payload) {
            Ok(subsystems) => subsystems,
            Err(err) => return drop_payload("SubSystems", &err),
        };
        let selected = self.model.is_selected(chain);
        for sub in &subsystems {
            let path = SubSystemPath::new(chain.clone(), sub.clone());
            if self.model.is_unbound_locally(&path) {
                debug!(
                    target: "sensor_console::router",
                    path = %path,
                    "router.drop=subsystem_removed"
                );
                continue;
            }
            self.model.bind_subsystem(chain, sub);
            self.subscribe(TopicFilter::exact(&Topic::SubSystemStatus(sub.clone())));
            self.subscribe(TopicFilter::exact(&Topic::SubSystemDefinition(sub.clone())));
            self.subscribe(TopicFilter::exact(&Topic::Outgoing(path.clone())));
            self.subscribe(TopicFilter::controls(&path));
            if selected {
                self.subscribe(TopicFilter::exact(&Topic::Rates(path.clone())));
                self.subscribe(TopicFilter::exact(&Topic::Incoming(path)));
            }
        }
        if selected {
            self.phase = Phase::SubsystemsBound;
        }
        debug!(
            target: "sensor_console::router",
            chain = %chain,
            count = subsystems.len(),
            "chain.subsystems"
        );
    }

    fn on_status(&mut self, sub: &SubSystemId, payload: &[u8]) {
        let raw = match decode_text(payload) {
            Ok(raw) => raw,
            Err(err) => return drop_payload("Status", &err),
        };
        let state = SubSystemState::from_status(raw);
        let now = self.now();
        self.model.record_status(sub, state, now);
        trace!(
            target: "sensor_console::router",
            subsystem = %sub,
            state = %state,
            "subsystem.status"
        );
    }

    fn on_definition(&mut self, sub: &SubSystemId, payload: &[u8]) {
        match decode_json::<Definition>(payload) {
            Ok(definition) => self.model.apply_definition(sub, &definition),
            Err(err) => drop_payload("Definition", &err),
        }
    }

    fn on_outgoing(&mut self, path: &SubSystemPath, payload: &[u8]) {
        let endpoint: Endpoint = match decode_json(payload) {
            Ok(endpoint) => endpoint,
            Err(err) => return drop_payload("Outgoing", &err),
        };
        // a retained endpoint can arrive after its subsystem was removed
        if !self.model.set_endpoint(path, endpoint) {
            debug!(
                target: "sensor_console::router",
                path = %path,
                "router.drop=outgoing_unbound"
            );
            return;
        }
        self.subscribe(TopicFilter::interpretations(path));
    }

    fn on_incoming(&mut self, path: &SubSystemPath, payload: &[u8]) {
        let endpoint: Endpoint = match decode_json(payload) {
            Ok(endpoint) => endpoint,
            Err(err) => return drop_payload("Incoming", &err),
        };
        if !endpoint.protocol_kind().accepts_incoming() || endpoint.source.is_none() {
            debug!(
                target: "sensor_console::router",
                path = %path,
                protocol = %endpoint.protocol,
                "router.drop=incoming"
            );
            return;
        }
        self.model.accept_incoming(path, endpoint);
    }

    fn on_rates(&mut self, path: &SubSystemPath, payload: &[u8]) {
        match decode_json::<RateReport>(payload) {
            Ok(report) => self.model.set_rate_mask(&path.subsystem, &report.total),
            Err(err) => drop_payload("Rates", &err),
        }
    }

    fn on_control(&mut self, path: &SubSystemPath, control: &ControlId, payload: &[u8]) {
        if !self.model.is_selected(&path.chain) {
            return;
        }
        let value: Control = match decode_json(payload) {
            Ok(value) => value,
            Err(err) => return drop_payload("Controls", &err),
        };
        if !self.model.upsert_control(path, control.clone(), value) {
            debug!(
                target: "sensor_console::router",
                path = %path,
                control = %control,
                "router.drop=control_unbound"
            );
        }
    }

    fn on_interpretation(&mut self, path: &SubSystemPath, stream: &StreamKey, payload: &[u8]) {
        if !self.model.is_bound(path) {
            debug!(
                target: "sensor_console::router",
                path = %path,
                stream = %stream,
                "router.drop=interpretation_unbound"
            );
            return;
        }
        let interpretation: Interpretation = match decode_json(payload) {
            Ok(interpretation) => interpretation,
            Err(err) => return drop_payload("Interpretation", &err),
        };
        let refresh_period_ms = match iso8601_millis(&interpretation.refresh_period) {
            Ok(ms) if ms > 0 => ms as u64,
            Ok(ms) => {
                warn!(
                    target: "sensor_console::router",
                    path = %path,
                    stream = %stream,
                    period_ms = ms,
                    "router.drop=non_positive_period"
                );
                return;
            }
            Err(err) => {
                warn!(
                    target: "sensor_console::router",
                    path = %path,
                    stream = %stream,
                    error = %err,
                    "router.drop=refresh_period"
                );
                return;
            }
        };

        let layout_key = interpretation
            .key
            .clone()
            .unwrap_or_else(|| stream.to_string());
        self.model
            .cache_layout(path, &layout_key, interpretation.data_types.clone());

        let layer = LayerId::stream(path.chain.clone(), path.subsystem.clone(), stream.clone());
        let records = Topic::Records {
            path: path.clone(),
            stream: stream.clone(),
        };
        let layer_display = interpretation.display;
        let first = self.model.register_layer(
            layer.clone(),
            LayerRecord {
                kind: LayerKind::Data(layer_display),
                interpretation: Some(interpretation.clone()),
            },
        );
        if !first {
            // the schema of a stream is fixed once decoded
            debug!(
                target: "sensor_console::router",
                layer = %layer,
                "layer.interpretation=repeat"
            );
            return;
        }
        self.model.set_route(
            records.to_string(),
            RecordRoute {
                layer: layer.clone(),
                display: layer_display,
            },
        );

        if !self.model.is_selected(&path.chain) || self.layers.contains(&layer) {
            return;
        }
        let sensor_origin = self
            .model
            .chain(&path.chain)
            .map(|chain| chain.origin())
            .unwrap_or_default();
        let init = StoreInit {
            layer: layer.clone(),
            sensor_origin,
            schema: RecordSchema::decode(&interpretation.header, layer_display),
            classifications: interpretation.classifications,
            refresh_period_ms,
            dot_size_m: interpretation.dot_size,
            preference: self.preferences.get(&layer),
        };
        let store = build_store(init, &self.config, &mut self.surface);
        let plan = store.poll_plan(&self.config);
        let now = self.now();
        self.layers.insert(store, plan, &mut self.scheduler, now);
        info!(
            target: "sensor_console::layers",
            layer = %layer,
            display = %layer_display,
            period_ms = refresh_period_ms,
            "layer.created"
        );
        self.subscribe(TopicFilter::exact(&records));
    }

    fn on_records(&mut self, path: &SubSystemPath, topic: &str, payload: &[u8]) {
        if !self.model.is_bound(path) {
            return;
        }
        let Some(route) = self.model.route(topic).cloned() else {
            debug!(
                target: "sensor_console::router",
                topic = %topic,
                "router.drop=records_unrouted"
            );
            return;
        };
        let text = match decode_text(payload) {
            Ok(text) => text,
            Err(err) => return drop_payload("Records", &err),
        };
        let now = self.now();
        let Some(store) = self.layers.store_mut(&route.layer) else {
            return;
        };
        for line in text.split('\n').map(|line| line.trim_end_matches('\r')) {
            if line.is_empty() {
                continue;
            }
            if let Err(err) = store.enqueue(line, now) {
                trace!(
                    target: "sensor_console::router",
                    layer = %route.layer,
                    display = %route.display,
                    error = %err,
                    "record.drop"
                );
            }
        }
    }
}

fn drop_payload(kind: &'static str, err: &dyn std::fmt::Display) {
    debug!(
        target: "sensor_console::router",
        kind,
        error = %err,
        "router.drop=payload"
    );
}
