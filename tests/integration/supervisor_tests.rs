//! Supervisor lifecycle: start validation, restart, teardown, outcome
//! stream tagging and device-store recording.

use super::mock_transport::{ADDR, Harness, terminal};
use wifiprov::adapters::store::{MemoryDeviceStore, record_outcome};
use wifiprov::app::events::{LinkId, ProvisioningEvent, SessionId, TransportEvent};
use wifiprov::app::ports::DeviceStore;
use wifiprov::error::{ConfigError, CredentialError, ProvisioningError};
use wifiprov::fsm::StateId;
use wifiprov::{ProvisionRequest, ProvisioningConfig, ProvisioningSupervisor};

fn harness() -> Harness {
    Harness::new(ProvisioningConfig::default())
}

#[test]
fn invalid_secret_is_rejected_before_any_radio_activity() {
    let mut h = harness();
    let err = h
        .sup
        .start(&mut h.transport, 0, ProvisionRequest::new(ADDR, "Net", "short"))
        .unwrap_err();
    assert_eq!(err, ProvisioningError::Credentials(CredentialError::InvalidSecret));
    assert!(h.transport.calls.is_empty());
    assert!(h.events().is_empty());
    assert!(!h.sup.is_active());
}

#[test]
fn open_network_is_accepted() {
    let mut h = harness();
    let id = h
        .sup
        .start(&mut h.transport, 0, ProvisionRequest::new(ADDR, "Cafe", ""))
        .unwrap();
    assert_eq!(h.sup.session_state(id), Some(StateId::Connecting));
}

#[test]
fn out_of_range_config_is_refused() {
    let config = ProvisioningConfig {
        max_connect_retries: 0,
        connect_timeout_ms: 0,
        ..ProvisioningConfig::default()
    };
    assert!(matches!(
        ProvisioningSupervisor::new(config),
        Err(ConfigError::ValidationFailed(_))
    ));
}

#[test]
fn config_from_json_drives_timing() {
    let config = ProvisioningConfig::from_json(
        r#"{"connect_timeout_ms": 5000, "max_connect_retries": 1, "retry_backoff_ms": 500}"#,
    )
    .unwrap();
    let mut h = Harness::new(config);
    h.start();
    while h.sup.is_active() {
        assert!(h.fire_next());
    }
    // 2 attempts x 5 s + one 0.5 s backoff
    assert_eq!(h.now, 10_500);
    assert_eq!(h.transport.connects(), 2);
}

#[test]
fn restarting_cancels_the_previous_session() {
    let mut h = harness();
    let first = h.start();
    h.deliver(TransportEvent::Connected);
    let second = h.start();

    assert_ne!(first, second);
    assert_eq!(h.sup.active_session(), Some(second));
    assert_eq!(h.sup.session_state(first), Some(StateId::Failed));
    assert_eq!(h.transport.releases(), [LinkId(1)]);
    assert_eq!(h.sup.active_link(), Some(LinkId(2)));

    let outcomes = h.outcomes.drain();
    let first_terminal: Vec<_> = outcomes
        .iter()
        .filter(|o| o.session == first && o.event.is_terminal())
        .map(|o| &o.event)
        .collect();
    assert_eq!(
        first_terminal,
        [&ProvisioningEvent::Failed(ProvisioningError::Cancelled)]
    );
    assert!(
        outcomes
            .iter()
            .any(|o| o.session == second && o.event == ProvisioningEvent::Started)
    );
}

#[test]
fn old_session_callbacks_do_not_reach_the_new_one() {
    let mut h = harness();
    h.start();
    let second = h.start();
    h.deliver_on(LinkId(1), TransportEvent::Connected);
    assert_eq!(h.sup.session_state(second), Some(StateId::Connecting));
}

#[test]
fn every_restarted_session_delivers_its_terminal_without_draining() {
    let mut h = harness();
    let ids: Vec<SessionId> = (0..40).map(|_| h.start()).collect();

    let outcomes = h.outcomes.drain();
    for id in &ids[..39] {
        let terminals: Vec<_> = outcomes
            .iter()
            .filter(|o| o.session == *id && o.event.is_terminal())
            .map(|o| &o.event)
            .collect();
        assert_eq!(
            terminals,
            [&ProvisioningEvent::Failed(ProvisioningError::Cancelled)],
            "session {id}"
        );
    }
    assert_eq!(h.sup.active_session(), ids.last().copied());
}

#[test]
fn teardown_is_idempotent() {
    let mut h = harness();
    h.start();
    h.sup.teardown(&mut h.transport, 10);
    h.sup.teardown(&mut h.transport, 20);
    assert_eq!(h.transport.releases(), [LinkId(1)]);
    assert_eq!(h.transport.closes(), 1);
    assert_eq!(terminal(&h.events()).len(), 1);
    assert_eq!(h.sup.next_deadline_ms(), None);
}

#[test]
fn unknown_session_ids_are_ignored() {
    let mut h = harness();
    h.start();
    assert!(!h.sup.cancel(&mut h.transport, 0, SessionId(99)));
    assert_eq!(h.sup.session_state(SessionId(99)), None);
    assert!(h.sup.is_active());
}

#[test]
fn every_outcome_is_tagged_with_its_session() {
    let mut h = harness();
    let id = h.to_awaiting_status();
    h.deliver(TransportEvent::Notification(br#"{"status":"connected"}"#.to_vec()));
    let outcomes = h.outcomes.drain();
    assert!(!outcomes.is_empty());
    assert!(outcomes.iter().all(|o| o.session == id));
}

#[test]
fn success_ip_is_recorded_in_the_store() {
    let mut h = harness();
    h.to_awaiting_status();
    h.deliver(TransportEvent::Notification(
        br#"{"status":"connected","ip_address":"10.0.0.5","device_id":"ESP32-Pool"}"#.to_vec(),
    ));

    let mut store = MemoryDeviceStore::new();
    let recorded = h
        .outcomes
        .drain()
        .iter()
        .filter_map(|o| record_outcome(&mut store, o).ok())
        .filter(|r| *r)
        .count();
    assert_eq!(recorded, 1);
    assert_eq!(store.device_ip("ESP32-Pool").as_deref(), Some("10.0.0.5"));
    assert_eq!(
        store.last_provisioned(),
        Some(("ESP32-Pool".to_owned(), "10.0.0.5".to_owned()))
    );
}

#[test]
fn outcomes_can_be_awaited() {
    let mut h = harness();
    h.start();
    let first = futures_lite::future::block_on(h.outcomes.next());
    assert_eq!(first.event, ProvisioningEvent::Started);
}
