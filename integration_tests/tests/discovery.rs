mod common;

use common::{chain, selected_chain_a, sub, Session};
use console_core::Phase;
use console_proto::{SubSystemState, EMPTY_RATE_MASK};

#[test]
fn selected_chain_binds_its_subsystems() {
    let mut session = Session::start(&[
        ("AvailableChains", r#"["A"]"#),
        ("SelectedChain", r#"{"id":"A"}"#),
        ("Chains/A/Setup/SubSystems", r#"["S1","S2"]"#),
    ]);
    session.console.pump();

    assert_eq!(session.console.phase(), Phase::SubsystemsBound);
    assert_eq!(session.console.model().selected(), Some(&chain("A")));
    for id in ["S1", "S2"] {
        for filter in [
            format!("AvailableSubSystems/{id}/Status"),
            format!("AvailableSubSystems/{id}/Definition"),
            format!("Chains/A/SubSystems/{id}/Controls/#"),
            format!("Chains/A/SubSystems/{id}/Rates"),
            format!("Chains/A/SubSystems/{id}/Incoming"),
        ] {
            assert!(session.subscribed(&filter), "missing subscription {filter}");
        }
    }
    let bound: Vec<String> = session
        .console
        .model()
        .bound(&chain("A"))
        .iter()
        .map(|s| s.id.to_string())
        .collect();
    assert_eq!(bound, ["S1", "S2"]);
}

#[test]
fn unselected_chains_skip_rates_and_incoming() {
    let session = Session::start(&[
        ("AvailableChains", r#"["A","B"]"#),
        ("SelectedChain", r#"{"id":"A"}"#),
        ("Chains/B/Setup/SubSystems", r#"["S9"]"#),
    ]);

    assert!(session.subscribed("AvailableSubSystems/S9/Status"));
    assert!(session.subscribed("Chains/B/SubSystems/S9/Controls/#"));
    assert!(!session.subscribed("Chains/B/SubSystems/S9/Rates"));
    assert!(!session.subscribed("Chains/B/SubSystems/S9/Incoming"));
    assert_eq!(session.console.phase(), Phase::ChainSelected);
}

#[test]
fn discovery_waits_for_a_selection() {
    let session = Session::start(&[("AvailableChains", r#"["A"]"#)]);

    assert_eq!(session.console.phase(), Phase::Discovering);
    assert!(session.subscribed("SelectedChain"));
    assert!(!session.subscribed("Chains/A/Setup/#"));
}

#[test]
fn repeated_setup_is_idempotent() {
    let mut session = Session::start(&selected_chain_a());
    let before = session.console.model().chain(&chain("A")).cloned();
    let subscribes = session.broker().subscribe_log().len();

    session.publish(
        "Chains/A/Setup",
        r#"{"label":"North","origin":{"latitude":45.0,"longitude":-75.0},"range":5000}"#,
    );

    assert_eq!(session.console.model().chain(&chain("A")).cloned(), before);
    assert_eq!(session.broker().subscribe_log().len(), subscribes);
    let record = before.unwrap();
    assert_eq!(record.label, "North");
    assert_eq!(record.range_m, 5_000.0);
}

#[test]
fn emptied_setup_is_ignored() {
    let mut session = Session::start(&selected_chain_a());
    session.publish("Chains/A/Setup", "");

    let record = session.console.model().chain(&chain("A")).unwrap();
    assert_eq!(record.label, "North");
}

#[test]
fn reselecting_the_active_chain_does_not_reload() {
    let mut session = Session::start(&selected_chain_a());

    session.publish("SelectedChain", r#"{"id":"A","isRunning":true}"#);
    assert!(session.console.model().chain(&chain("A")).unwrap().is_running);
    session.publish("SelectedChain", r#"{"id":"A","isRunning":false}"#);
    assert!(!session.console.model().chain(&chain("A")).unwrap().is_running);

    session.advance(5_000);
    assert_eq!(session.console.pending_reload(), None);
    assert_eq!(session.console.reload_count(), 0);
}

#[test]
fn switching_chains_reloads_exactly_once() {
    let mut session = Session::start(&selected_chain_a());

    session.publish("SelectedChain", r#"{"id":"B"}"#);
    session.publish("SelectedChain", r#"{"id":"B","isRunning":true}"#);
    assert_eq!(session.console.pending_reload(), Some(1_500));
    assert_eq!(session.console.reload_count(), 0);

    session.advance(1_500);
    assert_eq!(session.console.reload_count(), 1);
    session.advance(1_500);
    session.advance(1_500);
    assert_eq!(session.console.reload_count(), 1);
    assert_eq!(session.console.model().selected(), Some(&chain("B")));
}

#[test]
fn silent_subsystems_revert_to_unknown() {
    let mut retained = selected_chain_a();
    retained.push(("AvailableSubSystems/S1/Status", "Operational"));
    retained.push(("Chains/A/SubSystems/S1/Rates", r#"{"total":"012345"}"#));
    let mut session = Session::start(&retained);

    let state = |session: &Session| {
        let entry = session.console.model().available_subsystem(&sub("S1")).cloned();
        entry.unwrap_or_default()
    };
    assert_eq!(state(&session).state, SubSystemState::Operational);
    assert_eq!(state(&session).rate_mask, "012345");
    assert_eq!(
        session.console.model().chain(&chain("A")).unwrap().state,
        SubSystemState::Caution
    );

    for _ in 0..3 {
        session.advance(1_000);
    }
    assert_eq!(state(&session).state, SubSystemState::Operational);

    session.advance(1_000);
    assert_eq!(state(&session).state, SubSystemState::Unknown);
    assert_eq!(state(&session).rate_mask, EMPTY_RATE_MASK);
    assert_eq!(
        session.console.model().chain(&chain("A")).unwrap().state,
        SubSystemState::Unknown
    );
}
