//! Capture replay: a JSON-lines recording of broker traffic fed through the
//! in-memory loopback broker on a manual clock.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use console_core::{Console, HeadlessSurface, LoopbackBroker, ManualClock};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::app::Feed;
use crate::ui::FeedStatus;

fn default_retain() -> bool {
    true
}

/// One recorded publish. `payload` is either the raw text or any JSON value.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureEntry {
    pub topic: String,
    pub payload: Value,
    #[serde(default)]
    pub at_ms: u64,
    #[serde(default = "default_retain")]
    pub retain: bool,
}

impl CaptureEntry {
    pub fn payload_bytes(&self) -> Vec<u8> {
        match &self.payload {
            Value::String(text) => text.clone().into_bytes(),
            Value::Null => Vec::new(),
            other => other.to_string().into_bytes(),
        }
    }
}

pub fn parse_capture(text: &str) -> Result<Vec<CaptureEntry>> {
    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: CaptureEntry = serde_json::from_str(line)
            .wrap_err_with(|| format!("capture line {} is malformed", index + 1))?;
        entries.push(entry);
    }
    entries.sort_by_key(|entry| entry.at_ms);
    Ok(entries)
}

pub fn load_capture(path: &Path) -> Result<Vec<CaptureEntry>> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read capture {}", path.display()))?;
    parse_capture(&text)
}

pub struct ReplayFeed {
    pending: VecDeque<CaptureEntry>,
    total: usize,
    clock: Arc<ManualClock>,
    started: Instant,
    speed: f64,
}

impl ReplayFeed {
    pub fn new(entries: Vec<CaptureEntry>, clock: Arc<ManualClock>, speed: f64) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            1.0
        };
        Self {
            total: entries.len(),
            pending: entries.into(),
            clock,
            started: Instant::now(),
            speed,
        }
    }

    /// Inject every entry recorded at or before `now_ms`.
    pub fn deliver_until(&mut self, broker: &mut LoopbackBroker, now_ms: u64) -> usize {
        let mut delivered = 0;
        while self.pending.front().is_some_and(|entry| entry.at_ms <= now_ms) {
            let Some(entry) = self.pending.pop_front() else {
                break;
            };
            broker.inject(entry.topic.clone(), entry.payload_bytes(), entry.retain);
            delivered += 1;
        }
        if delivered > 0 && self.pending.is_empty() {
            info!(
                target: "sensor_console::inspector",
                total = self.total,
                "replay.finished"
            );
        }
        delivered
    }
}

impl Feed<LoopbackBroker> for ReplayFeed {
    fn advance(&mut self, console: &mut Console<LoopbackBroker, HeadlessSurface>) {
        let now_ms = (self.started.elapsed().as_secs_f64() * 1_000.0 * self.speed) as u64;
        self.clock.set(now_ms);
        self.deliver_until(console.broker_mut(), now_ms);
    }

    fn status(&self) -> FeedStatus {
        FeedStatus::Replaying {
            delivered: self.total - self.pending.len(),
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use console_core::BrokerTransport;
    use console_proto::{Topic, TopicFilter};

    const CAPTURE: &str = r#"
{"topic":"Chains/A/Setup","payload":{"label":"North"},"at_ms":20}
{"topic":"AvailableChains","payload":["A"],"at_ms":0}

{"topic":"AvailableSubSystems/S1/Status","payload":"Operational","at_ms":500,"retain":false}
"#;

    #[test]
    fn capture_is_ordered_by_time() {
        let entries = parse_capture(CAPTURE).unwrap();
        let topics: Vec<&str> = entries.iter().map(|e| e.topic.as_str()).collect();
        assert_eq!(
            topics,
            ["AvailableChains", "Chains/A/Setup", "AvailableSubSystems/S1/Status"]
        );
        assert_eq!(entries[0].payload_bytes(), br#"["A"]"#.to_vec());
        assert_eq!(entries[2].payload_bytes(), b"Operational".to_vec());
        assert!(!entries[2].retain);
    }

    #[test]
    fn malformed_lines_name_their_position() {
        let err = parse_capture("{\"topic\":\"A\",\"payload\":1}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn entries_are_released_as_the_clock_passes_them() {
        let clock = Arc::new(ManualClock::new(0));
        let mut feed = ReplayFeed::new(parse_capture(CAPTURE).unwrap(), clock, 1.0);
        let mut broker = LoopbackBroker::new();
        broker
            .subscribe(&TopicFilter::exact(&Topic::AvailableChains))
            .unwrap();

        assert_eq!(feed.deliver_until(&mut broker, 100), 2);
        assert_eq!(broker.drain_inbound().len(), 1);
        assert!(broker.retained("Chains/A/Setup").is_some());

        assert_eq!(feed.deliver_until(&mut broker, 1_000), 1);
        assert!(broker.retained("AvailableSubSystems/S1/Status").is_none());
        assert!(matches!(
            Feed::<LoopbackBroker>::status(&feed),
            FeedStatus::Replaying {
                delivered: 3,
                total: 3
            }
        ));
    }
}
