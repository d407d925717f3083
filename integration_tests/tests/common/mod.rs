#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use console_core::{
    Clock, Console, ConsoleConfig, HeadlessSurface, LoopbackBroker, ManualClock, PreferenceCache,
};
use console_proto::{ChainId, SubSystemId, SubSystemPath};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn test_config() -> Arc<ConsoleConfig> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_console_config.json");
    let config = ConsoleConfig::from_file(&config_path)
        .unwrap_or_else(|err| panic!("test console config {}: {err}", config_path.display()));
    Arc::new(config)
}

pub fn chain(id: &str) -> ChainId {
    ChainId::parse(id).unwrap()
}

pub fn sub(id: &str) -> SubSystemId {
    SubSystemId::parse(id).unwrap()
}

pub fn path(chain_id: &str, sub_id: &str) -> SubSystemPath {
    SubSystemPath::new(chain(chain_id), sub(sub_id))
}

pub struct Session {
    pub console: Console<LoopbackBroker, HeadlessSurface>,
    pub clock: Arc<ManualClock>,
}

impl Session {
    /// A started console over a broker seeded with `retained`.
    pub fn start(retained: &[(&str, &str)]) -> Self {
        init_tracing();
        let config = test_config();
        let mut broker = LoopbackBroker::new();
        for (topic, payload) in retained {
            broker.seed_retained(*topic, *payload);
        }
        let clock = Arc::new(ManualClock::new(0));
        let preferences = PreferenceCache::in_memory(&config.layers);
        let mut console = Console::new(
            config,
            broker,
            HeadlessSurface::new(),
            preferences,
            clock.clone() as Arc<dyn Clock>,
        );
        console.start();
        Self { console, clock }
    }

    /// Publish from another client and route the cascade.
    pub fn publish(&mut self, topic: &str, payload: &str) {
        self.console.broker_mut().inject(topic, payload, true);
        self.console.pump();
    }

    /// Move the clock forward and run one tick.
    pub fn advance(&mut self, delta_ms: u64) {
        self.clock.advance(delta_ms);
        self.console.tick();
    }

    pub fn broker(&self) -> &LoopbackBroker {
        self.console.broker()
    }

    pub fn subscribed(&self, filter: &str) -> bool {
        self.console.broker().is_subscribed(filter)
    }
}

/// Retained state of a selected two-stage chain `A` fed by `S1` then `S2`.
pub fn selected_chain_a() -> Vec<(&'static str, &'static str)> {
    vec![
        ("AvailableChains", r#"["A"]"#),
        ("SelectedChain", r#"{"id":"A","isRunning":false}"#),
        (
            "Chains/A/Setup",
            r#"{"label":"North","origin":{"latitude":45.0,"longitude":-75.0},"range":5000}"#,
        ),
        ("Chains/A/Setup/SubSystems", r#"["S1","S2"]"#),
        (
            "Chains/A/SubSystems/S1/Outgoing",
            r#"{"protocol":"MQTT","ip":"10.0.0.1","port":1883,"topics":["T1","T2"]}"#,
        ),
    ]
}
