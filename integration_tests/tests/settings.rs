mod common;

use anyhow::Result;
use common::{chain, path, selected_chain_a, sub, Session};
use console_core::ConsoleError;
use console_proto::{Control, ControlEdit, ControlId, GeoOrigin};
use serde_json::{json, Value};

fn with(extra: &[(&'static str, &'static str)]) -> Session {
    let mut retained = selected_chain_a();
    retained.extend_from_slice(extra);
    Session::start(&retained)
}

fn bound_ids(session: &Session, chain_id: &str) -> Vec<String> {
    session
        .console
        .model()
        .bound(&chain(chain_id))
        .iter()
        .map(|s| s.id.to_string())
        .collect()
}

fn published_json(session: &Session, topic: &str) -> Value {
    let message = session
        .broker()
        .published()
        .iter()
        .rev()
        .find(|m| m.topic == topic)
        .unwrap_or_else(|| panic!("nothing published on {topic}"));
    serde_json::from_slice(&message.payload).unwrap()
}

#[test]
fn save_clears_removed_topics_before_writing_state() -> Result<()> {
    let mut session = with(&[
        (
            "AvailableSubSystems/S3/Definition",
            r#"{"label":"Tracker","streams":["K1"]}"#,
        ),
    ]);
    session.console.remove_subsystem(&path("A", "S2"))?;
    assert!(session.console.add_subsystem_to_chain(&sub("S3"))?);
    assert!(!session.console.add_subsystem_to_chain(&sub("S3"))?);

    let published = session.console.save_settings()?;
    assert_eq!(published, 10);

    let log: Vec<String> = session
        .broker()
        .published()
        .iter()
        .map(|m| {
            let payload = String::from_utf8_lossy(&m.payload);
            if payload.is_empty() {
                format!("{} = <clear>", m.topic)
            } else {
                format!("{} = {}", m.topic, payload)
            }
        })
        .collect();
    insta::assert_snapshot!(log.join("\n"), @r#"
    Chains/A/SubSystems/S2/Incoming = <clear>
    Chains/A/SubSystems/S2/Outgoing = <clear>
    Chains/A/SubSystems/S1/Outgoing = {"protocol":"MQTT","ip":"10.0.0.1","port":1883,"topics":["T1","T2"]}
    Chains/A/SubSystems/S3/Outgoing = {"protocol":"MQTT","ip":"127.0.0.1","port":1883,"topics":["K1"]}
    Chains/A/SubSystems/S1/Incoming = {}
    Chains/A/SubSystems/S3/Incoming = {"protocol":"MQTT","ip":"10.0.0.1","port":1883,"topics":["T1"],"source":"S1"}
    Chains/A/Setup/SubSystems = ["S1","S3"]
    AvailableChains = ["A"]
    Chains/A/Setup = {"label":"North","origin":{"latitude":45.0,"longitude":-75.0},"range":5000.0}
    SelectedChain = {"id":"A","isRunning":false}
    "#);
    assert!(session.broker().published().iter().all(|m| m.options.retain && m.options.qos == 1));
    Ok(())
}

#[test]
fn save_reloads_from_the_written_state() -> Result<()> {
    let mut session = with(&[(
        "AvailableSubSystems/S3/Definition",
        r#"{"label":"Tracker","streams":["K1"]}"#,
    )]);
    session.console.remove_subsystem(&path("A", "S2"))?;
    session.console.add_subsystem_to_chain(&sub("S3"))?;
    session.console.save_settings()?;
    assert_eq!(session.broker().unsubscribe_all_calls(), 1);
    assert!(session.console.pending_reload().is_some());

    session.advance(1_500);

    assert_eq!(session.console.reload_count(), 1);
    assert_eq!(bound_ids(&session, "A"), ["S1", "S3"]);
    assert!(session
        .broker()
        .retained("Chains/A/SubSystems/S2/Outgoing")
        .is_none());
    let s3 = session
        .console
        .model()
        .bound_subsystem(&path("A", "S3"))
        .unwrap();
    assert_eq!(s3.endpoint.topics, ["K1"]);
    Ok(())
}

#[test]
fn undo_discards_local_edits() -> Result<()> {
    let mut session = with(&[]);
    session.console.add_subsystem_to_chain(&sub("S3"))?;
    session.console.move_subsystem_up(&path("A", "S3"));
    assert_eq!(bound_ids(&session, "A"), ["S1", "S3", "S2"]);

    session.console.undo_changes();

    assert_eq!(session.console.reload_count(), 1);
    assert_eq!(bound_ids(&session, "A"), ["S1", "S2"]);
    assert!(session.broker().published().is_empty());
    Ok(())
}

#[test]
fn incoming_needs_a_stream_protocol_and_a_source() {
    let session = with(&[(
        "Chains/A/SubSystems/S2/Incoming",
        r#"{"protocol":"MQTT","ip":"10.0.0.1","port":1883,"topics":["T2"],"source":"S1"}"#,
    )]);
    let model = session.console.model();
    let s1 = model.bound_subsystem(&path("A", "S1")).unwrap();
    assert_eq!(s1.endpoint.selected_topic.as_deref(), Some("T2"));
    let s2 = model.bound_subsystem(&path("A", "S2")).unwrap();
    let incoming = s2.data_streams["T2"].incoming.as_ref().unwrap();
    assert_eq!(incoming.source, Some(sub("S1")));

    for rejected in [
        r#"{"protocol":"UDP","ip":"10.0.0.1","port":1883,"topics":["T1"],"source":"S1"}"#,
        r#"{"protocol":"MQTT","ip":"10.0.0.1","port":1883,"topics":["T1"]}"#,
    ] {
        let mut session = with(&[("Chains/A/SubSystems/S2/Incoming", rejected)]);
        session.console.pump();
        let s1 = session
            .console
            .model()
            .bound_subsystem(&path("A", "S1"))
            .unwrap();
        assert_eq!(s1.endpoint.selected_topic, None, "accepted {rejected}");
    }
}

#[test]
fn control_edits_are_republished() -> Result<()> {
    let mut session = with(&[(
        "Chains/A/SubSystems/S1/Controls/Gain",
        r#"{"type":"Slider","label":"Gain","min":0,"max":10,"value":"2.5"}"#,
    )]);
    let gain = ControlId::parse("Gain")?;
    let s1 = path("A", "S1");

    session
        .console
        .set_control_value(&s1, &gain, &ControlEdit::Slide(42.0))?;
    session.console.pump();

    assert_eq!(
        published_json(&session, "Chains/A/SubSystems/S1/Controls/Gain"),
        json!({"type": "Slider", "label": "Gain", "min": 0.0, "max": 10.0, "value": 10.0})
    );
    let control = &session.console.model().bound_subsystem(&s1).unwrap().controls[&gain];
    assert!(matches!(control, Control::Slider { value, .. } if *value == 10.0));

    let err = session
        .console
        .set_control_value(&s1, &gain, &ControlEdit::Text("loud".into()))
        .unwrap_err();
    assert!(matches!(err, ConsoleError::RejectedEdit { .. }));
    Ok(())
}

#[test]
fn controls_of_other_chains_are_ignored() {
    let session = with(&[
        ("AvailableChains", r#"["A","B"]"#),
        ("Chains/B/Setup/SubSystems", r#"["S9"]"#),
        (
            "Chains/B/SubSystems/S9/Controls/Mode",
            r#"{"type":"Radio","label":"Mode","items":["a","b"],"selected":1}"#,
        ),
    ]);
    let s9 = session
        .console
        .model()
        .bound_subsystem(&path("B", "S9"))
        .unwrap();
    assert!(s9.controls.is_empty());
}

#[test]
fn toggling_running_announces_the_selection() -> Result<()> {
    let mut session = with(&[]);

    assert!(session.console.toggle_running()?);
    session.console.pump();

    assert_eq!(
        published_json(&session, "SelectedChain"),
        json!({"id": "A", "isRunning": true})
    );
    assert!(session.console.model().chain(&chain("A")).unwrap().is_running);
    assert_eq!(session.console.pending_reload(), None);
    Ok(())
}

#[test]
fn added_chains_are_saved_with_their_setup() -> Result<()> {
    let mut session = with(&[]);
    let added = session.console.add_chain();
    assert_eq!(added.as_str().len(), 32);
    assert_eq!(session.console.model().selected(), Some(&chain("A")));

    session
        .console
        .set_chain_setup(&added, "South", GeoOrigin::new(-10.0, 5.0), 2_500.0)?;
    session.console.save_settings()?;

    assert_eq!(
        published_json(&session, "AvailableChains"),
        json!(["A", added.as_str()])
    );
    assert_eq!(
        published_json(&session, &format!("Chains/{added}/Setup")),
        json!({"label": "South", "origin": {"latitude": -10.0, "longitude": 5.0}, "range": 2500.0})
    );
    assert_eq!(
        published_json(&session, &format!("Chains/{added}/Setup/SubSystems")),
        json!([])
    );
    Ok(())
}
