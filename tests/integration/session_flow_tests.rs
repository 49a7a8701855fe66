//! End-to-end session flows against the mock transport.
//!
//! Each test drives a full provisioning session through the public
//! supervisor API, delivering transport completions by hand and firing
//! timers by jumping the clock to the next deadline.

use super::mock_transport::{
    Harness, Op, SECRET, SSID, TransportCall, database, progress, terminal,
};
use wifiprov::app::events::{GattStatus, LinkId, ProvisioningEvent, TransportEvent};
use wifiprov::error::{
    CapabilityError, ProvisioningError, TransmissionError, TransportError,
};
use wifiprov::fsm::StateId;
use wifiprov::profile::{CCCD_UUID, ENABLE_NOTIFICATION, FirmwareGeneration, ProtocolProfile};
use wifiprov::ProvisioningConfig;

fn harness() -> Harness {
    Harness::new(ProvisioningConfig::default())
}

// ── Happy path ────────────────────────────────────────────────

#[test]
fn notification_reports_success_with_ip() {
    let mut h = harness();
    let id = h.to_awaiting_status();
    h.deliver(TransportEvent::Notification(
        br#"{"status":"connected","message":"ok","ip_address":"10.0.0.5"}"#.to_vec(),
    ));

    assert_eq!(h.sup.session_state(id), Some(StateId::Success));
    assert!(!h.sup.is_active());
    assert_eq!(h.sup.next_deadline_ms(), None);

    let events = h.events();
    assert_eq!(events.first(), Some(&ProvisioningEvent::Started));
    assert!(events.contains(&ProvisioningEvent::Connected));
    match terminal(&events).as_slice() {
        [ProvisioningEvent::Success(device)] => {
            assert_eq!(device.ip_address.as_deref(), Some("10.0.0.5"));
            assert_eq!(device.peripheral.as_str(), super::mock_transport::ADDR);
        }
        other => panic!("expected one Success, got {other:?}"),
    }
    assert_eq!(events.last().map(ProvisioningEvent::is_terminal), Some(true));
}

#[test]
fn notifications_are_armed_through_the_cccd() {
    let mut h = harness();
    h.to_awaiting_status();
    let profile = h.profile();

    let writes: Vec<_> = h
        .transport
        .calls
        .iter()
        .filter_map(|c| match c {
            TransportCall::WriteDescriptor { descriptor, value, .. } => Some((*descriptor, value.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec![(CCCD_UUID, ENABLE_NOTIFICATION.to_vec())]);
    assert!(h.transport.calls.contains(&TransportCall::SetNotifications {
        link: LinkId(1),
        enable: true,
    }));

    // notification arming happens before the credential write
    let arm_at = h
        .transport
        .calls
        .iter()
        .position(|c| matches!(c, TransportCall::WriteDescriptor { .. }));
    let write_at = h
        .transport
        .calls
        .iter()
        .position(|c| matches!(c, TransportCall::WriteCharacteristic { characteristic, .. } if *characteristic == profile.credential_char));
    assert!(arm_at < write_at);
}

#[test]
fn credentials_are_written_once_as_json() {
    let mut h = harness();
    h.to_awaiting_status();
    let writes = h.transport.credential_writes();
    assert_eq!(writes.len(), 1);

    let json: serde_json::Value = serde_json::from_slice(&writes[0]).unwrap();
    assert_eq!(json["ssid"], SSID);
    assert_eq!(json["password"], SECRET);
}

#[test]
fn secret_never_appears_in_outcomes() {
    let mut h = harness();
    h.to_awaiting_status();
    h.deliver(TransportEvent::Notification(br#"{"status":"connected"}"#.to_vec()));
    for event in h.events() {
        assert!(!format!("{event:?}").contains(SECRET));
    }
}

#[test]
fn progress_follows_the_protocol_steps() {
    let mut h = harness();
    h.to_awaiting_status();
    h.deliver(TransportEvent::Notification(
        br#"{"status":"connected","ip_address":"10.0.0.5"}"#.to_vec(),
    ));
    let events = h.events();
    assert_eq!(
        progress(&events),
        [
            "Connecting to device...",
            "Connected! Discovering services...",
            "Characteristics found. Setting up notifications...",
            "Ready to send WiFi credentials...",
            "Sending WiFi credentials...",
            "WiFi credentials sent. Waiting for connection...",
            "WiFi connected successfully!\nIP Address: 10.0.0.5",
        ]
    );
}

#[test]
fn legacy_firmware_uses_its_identifiers_and_fields() {
    let config = ProvisioningConfig {
        firmware: FirmwareGeneration::Legacy,
        ..ProvisioningConfig::default()
    };
    let mut h = Harness::new(config);
    assert_eq!(h.profile(), ProtocolProfile::legacy());

    let id = h.to_awaiting_status();
    h.deliver(TransportEvent::Notification(
        br#"{"status":"success","ip":"192.168.4.20","rssi":-61}"#.to_vec(),
    ));
    assert_eq!(h.sup.session_state(id), Some(StateId::Success));
    assert!(matches!(
        terminal(&h.events()).as_slice(),
        [ProvisioningEvent::Success(d)] if d.ip_address.as_deref() == Some("192.168.4.20")
    ));
}

// ── Connection retries ────────────────────────────────────────

#[test]
fn connect_timeouts_exhaust_the_retry_budget() {
    let mut h = harness();
    let id = h.start();
    while h.sup.is_active() {
        assert!(h.fire_next());
    }

    // 4 attempts x 15 s timeout + 3 x 2 s backoff
    assert_eq!(h.now, 66_000);
    assert_eq!(h.transport.connects(), 4);
    assert_eq!(h.transport.releases(), [LinkId(1), LinkId(2), LinkId(3), LinkId(4)]);
    assert_eq!(h.sup.session_state(id), Some(StateId::Failed));

    let events = h.events();
    assert_eq!(
        terminal(&events),
        [&ProvisioningEvent::Failed(ProvisioningError::RetriesExhausted {
            attempts: 4,
            last: TransportError::Timeout,
        })]
    );
    let notices: Vec<_> = progress(&events)
        .into_iter()
        .filter(|p| p.starts_with("Connection failed"))
        .collect();
    assert_eq!(
        notices,
        [
            "Connection failed, retrying (1/3)...",
            "Connection failed, retrying (2/3)...",
            "Connection failed, retrying (3/3)...",
        ]
    );
}

#[test]
fn failed_connect_recovers_on_the_next_attempt() {
    let mut h = harness();
    let id = h.start();
    h.deliver(TransportEvent::ConnectFailed(GattStatus::new(133)));
    assert_eq!(h.sup.session_state(id), Some(StateId::Connecting));
    assert_eq!(h.sup.next_deadline_ms(), Some(2_000));

    h.fire_next();
    assert_eq!(h.transport.connects(), 2);
    assert_eq!(h.sup.active_link(), Some(LinkId(2)));

    h.deliver(TransportEvent::Connected);
    assert_eq!(h.sup.session_state(id), Some(StateId::ServicesDiscovering));
}

#[test]
fn callbacks_from_an_abandoned_link_are_ignored() {
    let mut h = harness();
    let id = h.start();
    h.deliver(TransportEvent::ConnectFailed(GattStatus::new(133)));
    h.fire_next();

    h.deliver_on(LinkId(1), TransportEvent::Connected);
    assert_eq!(h.sup.session_state(id), Some(StateId::Connecting));
    h.deliver_on(LinkId(1), TransportEvent::Disconnected(GattStatus::new(8)));
    assert_eq!(h.transport.connects(), 2);
}

#[test]
fn unavailable_transport_fails_without_retrying() {
    let mut h = harness();
    h.transport.reject(Op::Connect, TransportError::Unavailable);
    let id = h.start();
    assert_eq!(h.sup.session_state(id), Some(StateId::Failed));
    assert_eq!(
        terminal(&h.events()),
        [&ProvisioningEvent::Failed(ProvisioningError::Transport(
            TransportError::Unavailable
        ))]
    );
}

#[test]
fn disconnect_before_write_ack_reconnects() {
    let mut h = harness();
    let id = h.start();
    let profile = h.profile();
    h.deliver(TransportEvent::Connected);
    h.fire_next();
    h.deliver(TransportEvent::ServicesDiscovered(Ok(database(&profile, true, true))));
    h.deliver(TransportEvent::DescriptorWritten(Ok(())));
    h.fire_next();
    assert_eq!(h.transport.credential_writes().len(), 1);

    h.deliver(TransportEvent::Disconnected(GattStatus::new(8)));
    assert_eq!(h.sup.session_state(id), Some(StateId::Connecting));
    assert_eq!(h.transport.releases(), [LinkId(1)]);
    assert!(h.events().contains(&ProvisioningEvent::Disconnected));

    h.fire_next();
    assert_eq!(h.transport.connects(), 2);
}

#[test]
fn link_drop_during_discovery_reports_disconnected() {
    let mut h = harness();
    let id = h.start();
    h.deliver(TransportEvent::Connected);
    h.deliver(TransportEvent::Disconnected(GattStatus::new(8)));

    assert_eq!(h.sup.session_state(id), Some(StateId::Connecting));
    assert_eq!(
        h.events(),
        [
            ProvisioningEvent::Started,
            ProvisioningEvent::Progress("Connecting to device...".into()),
            ProvisioningEvent::Connected,
            ProvisioningEvent::Progress("Connected! Discovering services...".into()),
            ProvisioningEvent::Disconnected,
            ProvisioningEvent::Progress("Connection failed, retrying (1/3)...".into()),
        ]
    );
}

#[test]
fn failed_connect_attempt_is_not_reported_as_disconnected() {
    let mut h = harness();
    h.start();
    h.deliver(TransportEvent::Disconnected(GattStatus::new(133)));

    let events = h.events();
    assert!(!events.contains(&ProvisioningEvent::Disconnected));
    assert!(progress(&events).contains(&"Connection failed, retrying (1/3)..."));
}

// ── Capabilities ──────────────────────────────────────────────

#[test]
fn missing_status_characteristic_fails_before_writing() {
    let mut h = harness();
    let id = h.start();
    let profile = h.profile();
    h.deliver(TransportEvent::Connected);
    h.fire_next();
    h.deliver(TransportEvent::ServicesDiscovered(Ok(database(&profile, false, false))));

    assert_eq!(h.sup.session_state(id), Some(StateId::Failed));
    assert!(h.transport.credential_writes().is_empty());
    assert_eq!(
        terminal(&h.events()),
        [&ProvisioningEvent::Failed(ProvisioningError::Capability(
            CapabilityError::StatusCharacteristicNotFound(profile.status_char)
        ))]
    );
}

#[test]
fn missing_service_fails_with_capability_error() {
    let mut h = harness();
    h.start();
    h.deliver(TransportEvent::Connected);
    h.fire_next();
    h.deliver(TransportEvent::ServicesDiscovered(Ok(Vec::new())));
    assert!(matches!(
        terminal(&h.events()).as_slice(),
        [ProvisioningEvent::Failed(ProvisioningError::Capability(
            CapabilityError::ServiceNotFound(_)
        ))]
    ));
}

#[test]
fn discovery_failure_is_an_error_outcome() {
    let mut h = harness();
    let id = h.start();
    h.deliver(TransportEvent::Connected);
    h.fire_next();
    h.deliver(TransportEvent::ServicesDiscovered(Err(GattStatus::new(129))));

    assert_eq!(h.sup.session_state(id), Some(StateId::Errored));
    assert_eq!(
        terminal(&h.events()),
        [&ProvisioningEvent::Error(ProvisioningError::Discovery(
            TransportError::Status(GattStatus::new(129))
        ))]
    );
    assert_eq!(h.transport.releases(), [LinkId(1)]);
}

#[test]
fn missing_cccd_degrades_to_polling() {
    let mut h = harness();
    let profile = h.profile();
    h.start();
    h.deliver(TransportEvent::Connected);
    h.fire_next();
    h.deliver(TransportEvent::ServicesDiscovered(Ok(database(&profile, true, false))));
    h.fire_next();

    assert!(!h.transport.calls.iter().any(|c| matches!(c, TransportCall::WriteDescriptor { .. })));
    assert_eq!(h.transport.credential_writes().len(), 1);
    assert!(progress(&h.events()).contains(&"Notifications unavailable, will poll status..."));
}

#[test]
fn rejected_descriptor_write_degrades_to_polling() {
    let mut h = harness();
    let profile = h.profile();
    h.transport.reject(Op::WriteDescriptor, TransportError::Rejected);
    let id = h.start();
    h.deliver(TransportEvent::Connected);
    h.fire_next();
    h.deliver(TransportEvent::ServicesDiscovered(Ok(database(&profile, true, true))));
    assert_eq!(h.sup.session_state(id), Some(StateId::NotificationsArming));

    h.fire_next();
    assert_eq!(h.sup.session_state(id), Some(StateId::CredentialSending));
    assert_eq!(h.transport.credential_writes().len(), 1);
}

// ── Transmission ──────────────────────────────────────────────

#[test]
fn rejected_credential_write_fails_the_session() {
    let mut h = harness();
    let profile = h.profile();
    h.transport.reject(Op::WriteCharacteristic, TransportError::PermissionDenied);
    let id = h.start();
    h.deliver(TransportEvent::Connected);
    h.fire_next();
    h.deliver(TransportEvent::ServicesDiscovered(Ok(database(&profile, true, true))));
    h.deliver(TransportEvent::DescriptorWritten(Ok(())));
    h.fire_next();

    assert_eq!(h.sup.session_state(id), Some(StateId::Failed));
    assert_eq!(
        terminal(&h.events()),
        [&ProvisioningEvent::Failed(ProvisioningError::Transmission(
            TransmissionError::WriteRejected(TransportError::PermissionDenied)
        ))]
    );
}

#[test]
fn write_error_status_fails_the_session() {
    let mut h = harness();
    let profile = h.profile();
    let id = h.start();
    h.deliver(TransportEvent::Connected);
    h.fire_next();
    h.deliver(TransportEvent::ServicesDiscovered(Ok(database(&profile, true, true))));
    h.deliver(TransportEvent::DescriptorWritten(Ok(())));
    h.fire_next();
    h.deliver(TransportEvent::CharacteristicWritten(Err(GattStatus::new(3))));

    assert_eq!(h.sup.session_state(id), Some(StateId::Failed));
    assert_eq!(
        terminal(&h.events()),
        [&ProvisioningEvent::Failed(ProvisioningError::Transmission(
            TransmissionError::WriteFailed(GattStatus::new(3))
        ))]
    );
}

// ── Status observation ────────────────────────────────────────

#[test]
fn connecting_status_keeps_polling_until_failure() {
    let mut h = harness();
    let id = h.to_awaiting_status();

    h.fire_next();
    assert_eq!(h.sup.session_state(id), Some(StateId::StatusPolling));
    assert_eq!(h.transport.reads(), 1);

    h.deliver(TransportEvent::CharacteristicRead(Ok(br#"{"status":"connecting"}"#.to_vec())));
    h.fire_next();
    assert_eq!(h.transport.reads(), 2);
    h.deliver(TransportEvent::CharacteristicRead(Ok(br#"{"status":"connecting"}"#.to_vec())));

    let events = h.events();
    assert!(terminal(&events).is_empty());
    assert_eq!(
        progress(&events)
            .iter()
            .filter(|p| **p == "ESP32 connecting to WiFi...")
            .count(),
        2
    );

    h.fire_next();
    h.deliver(TransportEvent::CharacteristicRead(Ok(
        br#"{"status":"failed","message":"Wrong password"}"#.to_vec(),
    )));
    assert_eq!(h.sup.session_state(id), Some(StateId::Failed));
    assert_eq!(
        terminal(&h.events()),
        [&ProvisioningEvent::Failed(ProvisioningError::Peripheral(
            "Wrong password".into()
        ))]
    );
}

#[test]
fn plain_text_failure_is_classified() {
    let mut h = harness();
    let id = h.to_awaiting_status();
    h.fire_next();
    h.deliver(TransportEvent::CharacteristicRead(Ok(b"WIFI FAILED TO CONNECT".to_vec())));
    assert_eq!(h.sup.session_state(id), Some(StateId::Failed));
}

#[test]
fn silent_peripheral_is_assumed_successful() {
    let mut h = harness();
    let id = h.to_awaiting_status();
    let written_at = h.now;

    h.fire_next();
    assert_eq!(h.transport.reads(), 1);
    h.fire_next();

    assert_eq!(h.now - written_at, 10_000);
    assert_eq!(h.sup.session_state(id), Some(StateId::Success));
    let events = h.events();
    assert!(progress(&events).contains(&"WiFi connection timeout - assuming success!"));
    assert!(matches!(
        terminal(&events).as_slice(),
        [ProvisioningEvent::Success(d)] if d.ip_address.is_none()
    ));
}

#[test]
fn link_drop_after_write_waits_for_completion() {
    let mut h = harness();
    let id = h.to_awaiting_status();
    h.deliver(TransportEvent::Disconnected(GattStatus::new(19)));

    let events = h.events();
    assert!(events.contains(&ProvisioningEvent::Disconnected));
    assert!(terminal(&events).is_empty());
    assert_eq!(h.sup.session_state(id), Some(StateId::AwaitingSettle));

    h.fire_next();
    assert_eq!(h.transport.reads(), 0);
    h.fire_next();
    assert_eq!(h.sup.session_state(id), Some(StateId::Success));
    assert_eq!(h.transport.releases(), [LinkId(1)]);
}

#[test]
fn read_failure_is_reported_as_progress() {
    let mut h = harness();
    let id = h.to_awaiting_status();
    h.fire_next();
    h.deliver(TransportEvent::CharacteristicRead(Err(GattStatus::new(2))));
    assert_eq!(h.sup.session_state(id), Some(StateId::StatusPolling));
    assert!(progress(&h.events()).contains(&"Status read failed (status: 2)"));
}

// ── Cancellation and late callbacks ───────────────────────────

#[test]
fn cancel_mid_arming_releases_once() {
    let mut h = harness();
    let profile = h.profile();
    let id = h.start();
    h.deliver(TransportEvent::Connected);
    h.fire_next();
    h.deliver(TransportEvent::ServicesDiscovered(Ok(database(&profile, true, true))));
    assert_eq!(h.sup.session_state(id), Some(StateId::NotificationsArming));

    assert!(h.sup.cancel(&mut h.transport, h.now, id));
    assert_eq!(h.sup.next_deadline_ms(), None);
    assert_eq!(h.transport.releases(), [LinkId(1)]);
    assert_eq!(h.transport.closes(), 1);
    assert_eq!(
        terminal(&h.events()),
        [&ProvisioningEvent::Failed(ProvisioningError::Cancelled)]
    );

    assert!(!h.sup.cancel(&mut h.transport, h.now, id));
    h.deliver_on(LinkId(1), TransportEvent::DescriptorWritten(Ok(())));
    h.sup.teardown(&mut h.transport, h.now);
    assert_eq!(h.transport.releases(), [LinkId(1)]);
    assert!(h.events().is_empty());
}

#[test]
fn callbacks_after_success_are_ignored() {
    let mut h = harness();
    h.to_awaiting_status();
    h.deliver(TransportEvent::Notification(br#"{"status":"connected"}"#.to_vec()));
    h.events();

    h.deliver_on(LinkId(1), TransportEvent::Disconnected(GattStatus::new(19)));
    h.deliver_on(
        LinkId(1),
        TransportEvent::Notification(br#"{"status":"failed"}"#.to_vec()),
    );
    h.advance(60_000);
    assert!(h.events().is_empty());
    assert_eq!(h.transport.releases(), [LinkId(1)]);
}
