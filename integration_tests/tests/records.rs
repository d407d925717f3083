mod common;

use common::{chain, path, selected_chain_a, sub, Session};
use console_core::{LatLng, Pane, PaneId, Shape};
use console_proto::{LayerId, StreamKey};

const PLOT_INTERPRETATION: &str = r#"{"header":"Type,Latitude,Longitude","display":"Plot","classifications":[{"paletteIndex":0},{"paletteIndex":3}],"refreshPeriod":"PT1S"}"#;

const TRACK_INTERPRETATION: &str = r#"{"header":"Identifier,Latitude,Longitude,Speed,Bearing,Type,Info","display":"Track","classifications":[{"paletteIndex":1,"symbolIndex":1}],"refreshPeriod":"PT1S"}"#;

fn layer(stream: &str) -> LayerId {
    LayerId::stream(chain("A"), sub("S1"), StreamKey::parse(stream).unwrap())
}

fn with_interpretation(stream: &'static str, interpretation: &'static str) -> Session {
    let mut retained = selected_chain_a();
    let topic: &'static str = match stream {
        "T1" => "Chains/A/SubSystems/S1/Data/T1/Interpretation",
        _ => "Chains/A/SubSystems/S1/Data/T2/Interpretation",
    };
    retained.push((topic, interpretation));
    Session::start(&retained)
}

fn points(session: &Session, layer: &LayerId) -> Vec<LatLng> {
    session
        .console
        .surface()
        .panes_of(layer)
        .flat_map(|(_, pane)| pane.entities.iter())
        .filter_map(|entity| match entity.shape {
            Shape::Point { at, .. } => Some(at),
            _ => None,
        })
        .collect()
}

#[test]
fn plot_record_reaches_the_surface() {
    let mut session = with_interpretation("T1", PLOT_INTERPRETATION);
    let layer = layer("T1");
    assert_eq!(layer.to_string(), "A.S1.T1");
    assert!(session.console.layers().contains(&layer));
    assert!(session.subscribed("Chains/A/SubSystems/S1/Data/T1/Records"));

    session.publish("Chains/A/SubSystems/S1/Data/T1/Records", "0,10.0,20.0");
    session.console.tick();

    assert_eq!(points(&session, &layer), vec![LatLng::new(10.0, 20.0)]);
    let class_zero = PaneId::new(
        layer.clone(),
        Pane::Plot {
            generation: 0,
            class: 0,
        },
    );
    assert_eq!(session.console.surface().entities(&class_zero).len(), 1);
}

#[test]
fn malformed_lines_do_not_spoil_their_batch() {
    let mut session = with_interpretation("T1", PLOT_INTERPRETATION);
    let layer = layer("T1");

    session.publish(
        "Chains/A/SubSystems/S1/Data/T1/Records",
        "garbage\r\n0,10.0,20.0\r\n\r\n7,1.0,1.0\n1,11.0,21.0",
    );
    session.console.tick();

    let mut found = points(&session, &layer);
    found.sort_by(|a, b| a.lat.total_cmp(&b.lat));
    assert_eq!(found, vec![LatLng::new(10.0, 20.0), LatLng::new(11.0, 21.0)]);
}

#[test]
fn repeated_interpretation_keeps_one_store() {
    let mut session = with_interpretation("T1", PLOT_INTERPRETATION);
    let timers = session.console.timer_count();
    let subscribes = session.broker().subscribe_log().len();

    session.publish(
        "Chains/A/SubSystems/S1/Data/T1/Interpretation",
        PLOT_INTERPRETATION,
    );

    assert_eq!(session.console.layers().len(), 1);
    assert_eq!(session.console.timer_count(), timers);
    assert_eq!(session.broker().subscribe_log().len(), subscribes);
}

#[test]
fn non_positive_refresh_period_is_rejected() {
    let session = with_interpretation(
        "T2",
        r#"{"header":"Type,Latitude,Longitude","display":"Plot","refreshPeriod":"PT0S"}"#,
    );

    assert!(!session.console.layers().contains(&layer("T2")));
    assert!(!session.subscribed("Chains/A/SubSystems/S1/Data/T2/Records"));
}

#[test]
fn silent_tracks_are_evicted_with_every_visual() {
    let mut session = with_interpretation("T1", TRACK_INTERPRETATION);
    let layer = layer("T1");
    let records = "Chains/A/SubSystems/S1/Data/T1/Records";

    session.publish(
        records,
        "\"T-1\",45.1,-75.1,10,90,0,\"lead\"\n\"T-2\",45.2,-75.2,12,180,0,\"wing\"",
    );
    session.console.tick();
    let targets = PaneId::new(layer.clone(), Pane::TrackTargets);
    assert_eq!(session.console.surface().entities(&targets).len(), 2);

    for _ in 0..3 {
        session.advance(1_000);
    }
    session.publish(records, "\"T-2\",45.3,-75.3,12,180,0,\"wing\"");
    session.advance(1_000);

    let keys: Vec<&str> = session
        .console
        .surface()
        .entities(&targets)
        .iter()
        .map(|entity| entity.key.as_str())
        .collect();
    assert_eq!(keys, ["T-2"]);
    for pane in [Pane::TrackHotZones, Pane::TrackPopups] {
        let pane = PaneId::new(layer.clone(), pane);
        assert!(session
            .console
            .surface()
            .entities(&pane)
            .iter()
            .all(|entity| entity.key != "T-1"));
    }
    assert_eq!(session.console.surface().count(&layer), Some(1));
}

#[test]
fn removing_a_subsystem_cancels_its_timers() {
    let mut session = with_interpretation("T1", PLOT_INTERPRETATION);
    let layer = layer("T1");
    // heartbeat sweep plus refresh and prune
    assert_eq!(session.console.timer_count(), 3);

    session.console.remove_subsystem(&path("A", "S1")).unwrap();

    assert_eq!(session.console.timer_count(), 1);
    assert!(!session.console.layers().contains(&layer));
    assert_eq!(session.console.surface().panes_of(&layer).count(), 0);

    session.publish("Chains/A/SubSystems/S1/Data/T1/Records", "0,10.0,20.0");
    session.advance(1_000);
    assert!(points(&session, &layer).is_empty());
}

#[test]
fn removing_a_chain_tears_down_its_layers() {
    let mut session = with_interpretation("T1", PLOT_INTERPRETATION);
    assert!(session.console.layers().rosette(&chain("A")).is_some());

    session.console.remove_chain(&chain("A")).unwrap();

    assert_eq!(session.console.timer_count(), 1);
    assert!(session.console.layers().rosette(&chain("A")).is_none());
    assert!(session.console.layers().is_empty());
    // the last chain is replaced by a fresh, selected one
    let chains = session.console.model().available_chains().to_vec();
    assert_eq!(chains.len(), 1);
    assert_ne!(chains[0], chain("A"));
    assert_eq!(session.console.model().selected(), Some(&chains[0]));
}

#[test]
fn removed_subsystem_stays_gone_after_a_resubscribe() {
    let mut session = with_interpretation("T1", PLOT_INTERPRETATION);
    let layer = layer("T1");

    session.console.remove_subsystem(&path("A", "S1")).unwrap();

    for filter in [
        "Chains/A/SubSystems/S1/Outgoing",
        "Chains/A/SubSystems/S1/Controls/#",
        "Chains/A/SubSystems/S1/Data/+/Interpretation",
        "Chains/A/SubSystems/S1/Data/T1/Records",
        "Chains/A/SubSystems/S1/Rates",
        "Chains/A/SubSystems/S1/Incoming",
    ] {
        assert!(!session.subscribed(filter), "{filter} still subscribed");
        assert!(session
            .console
            .subscriptions()
            .iter()
            .all(|f| f.as_str() != filter));
    }
    assert!(session.subscribed("Chains/A/SubSystems/S2/Outgoing"));

    session.console.resubscribe();
    session.console.pump();

    assert!(!session.console.layers().contains(&layer));
    assert_eq!(session.console.timer_count(), 1);
    assert!(!session.console.model().is_bound(&path("A", "S1")));
}

#[test]
fn interpretation_for_an_unbound_path_creates_no_layer() {
    let mut session = with_interpretation("T1", PLOT_INTERPRETATION);
    session.console.remove_subsystem(&path("A", "S1")).unwrap();

    session.publish(
        "Chains/A/SubSystems/S1/Data/T1/Interpretation",
        PLOT_INTERPRETATION,
    );
    session.console.route(&console_core::InboundMessage::new(
        "Chains/A/SubSystems/S1/Data/T1/Interpretation",
        PLOT_INTERPRETATION,
    ));

    assert!(!session.console.layers().contains(&layer("T1")));
    assert_eq!(session.console.timer_count(), 1);
    assert!(!session.subscribed("Chains/A/SubSystems/S1/Data/T1/Records"));
}

#[test]
fn removed_chain_releases_its_filters() {
    let mut session = with_interpretation("T1", PLOT_INTERPRETATION);

    session.console.remove_chain(&chain("A")).unwrap();

    assert!(!session.subscribed("Chains/A/Setup/#"));
    assert!(session
        .broker()
        .subscriptions()
        .iter()
        .all(|filter| !filter.as_str().starts_with("Chains/A/")));

    session.console.resubscribe();
    session.console.pump();

    assert!(session.console.layers().is_empty());
    assert_eq!(session.console.timer_count(), 1);
    assert!(!session.console.model().available_chains().contains(&chain("A")));
}
