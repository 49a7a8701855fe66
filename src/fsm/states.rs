//! Concrete state handler functions and table builder.
//!
//! Each state is three plain `fn` pointers with no closures and no
//! dynamic dispatch.  Every handler starts with the same guard (`Cancel` ends the
//! session from any live state) and then reacts to the inputs that are
//! meaningful where it is; anything else is logged and dropped.
//!
//! ```text
//!  IDLE ─start─▶ CONNECTING ─connected─▶ SERVICES_DISCOVERING ─discovered─▶ CAPABILITIES_RESOLVING
//!                  ▲    │ fail/timeout                                              │
//!                  └────┘ (backoff, bounded)                                        ▼
//!                                                                       NOTIFICATIONS_ARMING
//!                                                                                   │ settle
//!                                                                                   ▼
//!  STATUS_POLLING ◀─settle read── AWAITING_SETTLE ◀─write ack── CREDENTIAL_SENDING
//!    │  ▲ connecting (poll)
//!    └──┘
//!    ├─connected / completion assumed──▶ SUCCESS
//!    └─failed / error─────────────────▶ FAILED
//!
//!  any live state ─cancel / fatal──▶ FAILED | ERRORED
//!  link lost before the write ack ─▶ CONNECTING (retry) | FAILED
//! ```

use log::{debug, error, info, warn};

use super::context::{Capabilities, SessionContext};
use super::{StateDescriptor, StateId};
use crate::app::events::{
    CharacteristicRef, GattService, GattStatus, ProvisionedDevice, ProvisioningEvent,
    TransportEvent,
};
use crate::app::session::{RequestKind, SessionInput, TransportRequest};
use crate::codec::{self, StatusTag};
use crate::error::{CapabilityError, ProvisioningError, TransmissionError, TransportError};
use crate::profile::ENABLE_NOTIFICATION;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::timers::TimerKind;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once per session.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: None,
            on_exit: None,
            on_input: idle_input,
        },
        StateDescriptor {
            id: StateId::Connecting,
            name: "Connecting",
            on_enter: Some(connecting_enter),
            on_exit: None,
            on_input: connecting_input,
        },
        StateDescriptor {
            id: StateId::ServicesDiscovering,
            name: "ServicesDiscovering",
            on_enter: None,
            on_exit: None,
            on_input: discovering_input,
        },
        StateDescriptor {
            id: StateId::CapabilitiesResolving,
            name: "CapabilitiesResolving",
            on_enter: Some(resolving_enter),
            on_exit: None,
            on_input: resolving_input,
        },
        StateDescriptor {
            id: StateId::NotificationsArming,
            name: "NotificationsArming",
            on_enter: Some(arming_enter),
            on_exit: None,
            on_input: arming_input,
        },
        StateDescriptor {
            id: StateId::CredentialSending,
            name: "CredentialSending",
            on_enter: Some(sending_enter),
            on_exit: None,
            on_input: sending_input,
        },
        StateDescriptor {
            id: StateId::AwaitingSettle,
            name: "AwaitingSettle",
            on_enter: None,
            on_exit: None,
            on_input: settle_input,
        },
        StateDescriptor {
            id: StateId::StatusPolling,
            name: "StatusPolling",
            on_enter: None,
            on_exit: None,
            on_input: polling_input,
        },
        StateDescriptor {
            id: StateId::Success,
            name: "Success",
            on_enter: Some(success_enter),
            on_exit: None,
            on_input: terminal_input,
        },
        StateDescriptor {
            id: StateId::Failed,
            name: "Failed",
            on_enter: Some(failed_enter),
            on_exit: None,
            on_input: terminal_input,
        },
        StateDescriptor {
            id: StateId::Errored,
            name: "Errored",
            on_enter: Some(errored_enter),
            on_exit: None,
            on_input: terminal_input,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared helpers
// ═══════════════════════════════════════════════════════════════════════════

fn cancelled(ctx: &mut SessionContext) -> Option<StateId> {
    info!("session cancelled by caller");
    ctx.fail(ProvisioningError::Cancelled)
}

fn ignored(state: &str, input: &SessionInput) -> Option<StateId> {
    debug!("{state}: ignoring {input:?}");
    None
}

/// Issue a connect request (timeout armed first so a rejection can cancel it).
fn begin_connect(ctx: &mut SessionContext) {
    ctx.backoff_pending = false;
    let timeout = ctx.config.connect_timeout();
    ctx.arm(TimerKind::ConnectTimeout, timeout);
    ctx.progress("Connecting to device...");
    let peripheral = ctx.peripheral.clone();
    ctx.request(TransportRequest::Connect { peripheral });
}

/// The link failed before the credential write was acknowledged.
///
/// Reports `Disconnected` if the link had come up, releases it, then either
/// schedules a reconnect (returning to `Connecting`) or gives up.
fn connection_lost(ctx: &mut SessionContext, reason: TransportError) -> Option<StateId> {
    if ctx.link_up && matches!(reason, TransportError::Disconnected(_)) {
        info!("link to {} dropped ({reason})", ctx.peripheral);
        ctx.emit(ProvisioningEvent::Disconnected);
    }
    ctx.cancel(TimerKind::ConnectTimeout);
    ctx.cancel(TimerKind::DiscoverySettle);
    ctx.cancel(TimerKind::CredentialSettle);
    ctx.release();
    ctx.capabilities = Capabilities::default();
    ctx.notifications_enabled = false;

    match ctx.retry.decide(ctx.retries(), &reason) {
        RetryDecision::RetryAfter(delay) => {
            let n = ctx.spend_retry();
            let max = ctx.retry.max_retries;
            warn!("connection lost ({reason}), retry {n}/{max} in {}ms", delay.as_millis());
            ctx.backoff_pending = true;
            ctx.arm(TimerKind::ConnectBackoff, delay);
            ctx.progress(format!("Connection failed, retrying ({n}/{max})..."));
            Some(StateId::Connecting)
        }
        RetryDecision::GiveUp if RetryPolicy::is_retryable(&reason) => {
            ctx.fail(ProvisioningError::RetriesExhausted {
                attempts: ctx.retries().saturating_add(1),
                last: reason,
            })
        }
        RetryDecision::GiveUp => ctx.fail(ProvisioningError::Transport(reason)),
    }
}

/// Link dropped after the write was acknowledged.  Expected while the
/// peripheral reconfigures its radio; the completion timer decides.
fn post_write_disconnect(ctx: &mut SessionContext, status: GattStatus) -> Option<StateId> {
    ctx.release();
    if ctx.is_armed(TimerKind::CompletionAssumed) {
        info!(
            "peripheral dropped the link after the write (status {}), awaiting completion",
            status.code()
        );
        ctx.emit(ProvisioningEvent::Disconnected);
        ctx.progress("Device disconnected, waiting for WiFi connection...");
        None
    } else {
        ctx.fail(TransportError::Disconnected(status))
    }
}

fn read_status(ctx: &mut SessionContext) {
    let Some(status) = ctx.capabilities.status else {
        return;
    };
    if ctx.request_on_link(|link| TransportRequest::ReadStatus {
        link,
        characteristic: status,
    }) {
        ctx.status_reads += 1;
    } else {
        debug!("status read skipped, link gone; waiting for completion timer");
    }
}

/// Treat the session as provisionally successful.
fn assume_success(ctx: &mut SessionContext) -> Option<StateId> {
    warn!("no definitive status before the completion window closed; assuming success");
    ctx.progress("WiFi connection timeout - assuming success!");
    ctx.succeed(None, None)
}

/// Decode and dispatch one status payload.
///
/// `schedule_poll` is `false` while the settle read is still pending, so a
/// `connecting` notification does not double up with it.
fn observe_status(ctx: &mut SessionContext, bytes: &[u8], schedule_poll: bool) -> Option<StateId> {
    let report = codec::decode_status(&ctx.profile, bytes);
    match report.status {
        StatusTag::Connected => {
            let mut text = String::from("WiFi connected successfully!");
            if let Some(ip) = &report.ip_address {
                text.push_str("\nIP Address: ");
                text.push_str(ip);
            }
            info!(
                "peripheral joined the network (ip {:?}, rssi {:?})",
                report.ip_address, report.rssi
            );
            ctx.progress(text);
            ctx.succeed(report.ip_address, report.device_id)
        }
        StatusTag::Connecting => {
            ctx.progress("ESP32 connecting to WiFi...");
            if schedule_poll {
                let interval = ctx.config.status_poll_interval();
                ctx.arm(TimerKind::StatusPoll, interval);
            }
            None
        }
        StatusTag::Failed | StatusTag::Error => {
            warn!("peripheral reported '{}': {}", report.raw_status, report.message);
            ctx.fail(ProvisioningError::Peripheral(report.message))
        }
        StatusTag::Ready => {
            ctx.progress(format!("ESP32 ready: {}", report.message));
            None
        }
        StatusTag::Unknown if report.heuristic => {
            ctx.progress(format!("Received: {}", report.raw_status));
            None
        }
        StatusTag::Unknown => {
            ctx.progress(format!("Status: {} - {}", report.raw_status, report.message));
            None
        }
    }
}

/// Arm the settle delay that precedes the credential write.
fn schedule_credentials(ctx: &mut SessionContext) {
    if ctx.is_armed(TimerKind::CredentialSettle) {
        return;
    }
    let settle = ctx.config.notification_settle();
    ctx.arm(TimerKind::CredentialSettle, settle);
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<StateId> {
    match input {
        SessionInput::Cancel => cancelled(ctx),
        SessionInput::Start => {
            info!("provisioning {} ({})", ctx.peripheral, ctx.profile.generation.name());
            ctx.emit(ProvisioningEvent::Started);
            Some(StateId::Connecting)
        }
        other => ignored("Idle", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter(ctx: &mut SessionContext) -> Option<StateId> {
    // Re-entry after a lost link waits for the backoff timer instead.
    if !ctx.backoff_pending {
        begin_connect(ctx);
    }
    None
}

fn connecting_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<StateId> {
    match input {
        SessionInput::Cancel => cancelled(ctx),
        SessionInput::LinkOpened(link) => {
            ctx.link = Some(*link);
            None
        }
        SessionInput::Transport(TransportEvent::Connected) => {
            ctx.cancel(TimerKind::ConnectTimeout);
            ctx.link_up = true;
            info!("connected to {}", ctx.peripheral);
            ctx.emit(ProvisioningEvent::Connected);
            ctx.progress("Connected! Discovering services...");
            let settle = ctx.config.discovery_settle();
            ctx.arm(TimerKind::DiscoverySettle, settle);
            Some(StateId::ServicesDiscovering)
        }
        SessionInput::Transport(TransportEvent::ConnectFailed(status)) => {
            connection_lost(ctx, TransportError::Status(*status))
        }
        SessionInput::Transport(TransportEvent::Disconnected(status)) => {
            connection_lost(ctx, TransportError::Disconnected(*status))
        }
        SessionInput::TimerFired(TimerKind::ConnectTimeout) => {
            connection_lost(ctx, TransportError::Timeout)
        }
        SessionInput::TimerFired(TimerKind::ConnectBackoff) => {
            begin_connect(ctx);
            None
        }
        SessionInput::Rejected(RequestKind::Connect, err) => connection_lost(ctx, *err),
        other => ignored("Connecting", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  SERVICES_DISCOVERING
// ═══════════════════════════════════════════════════════════════════════════

fn discovering_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<StateId> {
    match input {
        SessionInput::Cancel => cancelled(ctx),
        SessionInput::TimerFired(TimerKind::DiscoverySettle) => {
            if !ctx.request_on_link(|link| TransportRequest::DiscoverServices { link }) {
                return ctx.error(ProvisioningError::Discovery(TransportError::NotConnected));
            }
            None
        }
        SessionInput::Transport(TransportEvent::ServicesDiscovered(Ok(services))) => {
            ctx.services.clone_from(services);
            Some(StateId::CapabilitiesResolving)
        }
        SessionInput::Transport(TransportEvent::ServicesDiscovered(Err(status))) => {
            error!("service discovery failed with status {}", status.code());
            ctx.error(ProvisioningError::Discovery(TransportError::Status(*status)))
        }
        SessionInput::Rejected(RequestKind::DiscoverServices, err) => {
            ctx.error(ProvisioningError::Discovery(*err))
        }
        SessionInput::Transport(TransportEvent::Disconnected(status)) => {
            connection_lost(ctx, TransportError::Disconnected(*status))
        }
        other => ignored("ServicesDiscovering", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CAPABILITIES_RESOLVING (pass-through)
// ═══════════════════════════════════════════════════════════════════════════

fn log_services(services: &[GattService]) {
    debug!("discovered {} service(s)", services.len());
    for service in services {
        debug!("  service {}", service.uuid);
        for c in &service.characteristics {
            debug!("    characteristic {} ({} descriptor(s))", c.uuid, c.descriptors.len());
        }
    }
}

fn resolving_enter(ctx: &mut SessionContext) -> Option<StateId> {
    log_services(&ctx.services);

    let profile = ctx.profile;
    let Some(service) = ctx.services.iter().find(|s| s.uuid == profile.service) else {
        let found: Vec<String> = ctx.services.iter().map(|s| s.uuid.to_string()).collect();
        error!(
            "provisioning service {} not found; available: [{}]",
            profile.service,
            found.join(", ")
        );
        return ctx.fail(CapabilityError::ServiceNotFound(profile.service));
    };

    let at = |uuid| CharacteristicRef {
        service: service.uuid,
        characteristic: uuid,
    };

    let Some(_) = service.characteristic(profile.credential_char) else {
        error!("credential characteristic {} missing", profile.credential_char);
        return ctx.fail(CapabilityError::CredentialCharacteristicNotFound(profile.credential_char));
    };
    let Some(status) = service.characteristic(profile.status_char) else {
        error!("status characteristic {} missing", profile.status_char);
        return ctx.fail(CapabilityError::StatusCharacteristicNotFound(profile.status_char));
    };

    let auxiliary = profile
        .auxiliary_char
        .filter(|uuid| service.characteristic(*uuid).is_some())
        .map(at);
    if let Some(aux) = auxiliary {
        info!("auxiliary characteristic {} present", aux.characteristic);
    }

    ctx.capabilities = Capabilities {
        credential: Some(at(profile.credential_char)),
        status: Some(at(profile.status_char)),
        status_notify_descriptor: status.has_descriptor(profile.cccd),
        auxiliary,
    };
    ctx.progress("Characteristics found. Setting up notifications...");
    Some(StateId::NotificationsArming)
}

fn resolving_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<StateId> {
    match input {
        SessionInput::Cancel => cancelled(ctx),
        other => ignored("CapabilitiesResolving", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  NOTIFICATIONS_ARMING
// ═══════════════════════════════════════════════════════════════════════════

fn degrade_notifications(ctx: &mut SessionContext, why: &str) {
    warn!("notifications unavailable ({why}); status will be polled");
    ctx.notifications_enabled = false;
    ctx.progress("Notifications unavailable, will poll status...");
    schedule_credentials(ctx);
}

fn arming_enter(ctx: &mut SessionContext) -> Option<StateId> {
    let Some(status) = ctx.capabilities.status else {
        degrade_notifications(ctx, "status characteristic unresolved");
        return None;
    };
    if !ctx.capabilities.status_notify_descriptor {
        degrade_notifications(ctx, "no notification descriptor");
        return None;
    }

    let cccd = ctx.profile.cccd;
    let issued = ctx.request_on_link(|link| TransportRequest::EnableNotifications {
        link,
        characteristic: status,
    }) && ctx.request_on_link(|link| TransportRequest::WriteDescriptor {
        link,
        characteristic: status,
        descriptor: cccd,
        value: ENABLE_NOTIFICATION,
    });
    if !issued {
        degrade_notifications(ctx, "no link");
    }
    None
}

fn arming_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<StateId> {
    match input {
        SessionInput::Cancel => cancelled(ctx),
        SessionInput::Transport(TransportEvent::DescriptorWritten(Ok(()))) => {
            info!("status notifications enabled");
            ctx.notifications_enabled = true;
            ctx.progress("Ready to send WiFi credentials...");
            schedule_credentials(ctx);
            None
        }
        SessionInput::Transport(TransportEvent::DescriptorWritten(Err(status))) => {
            degrade_notifications(ctx, &format!("descriptor write status {}", status.code()));
            None
        }
        SessionInput::Rejected(
            kind @ (RequestKind::EnableNotifications | RequestKind::WriteDescriptor),
            err,
        ) => {
            degrade_notifications(ctx, &format!("{kind:?} rejected: {err}"));
            None
        }
        SessionInput::TimerFired(TimerKind::CredentialSettle) => Some(StateId::CredentialSending),
        SessionInput::Transport(TransportEvent::Disconnected(status)) => {
            connection_lost(ctx, TransportError::Disconnected(*status))
        }
        other => ignored("NotificationsArming", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CREDENTIAL_SENDING
// ═══════════════════════════════════════════════════════════════════════════

fn sending_enter(ctx: &mut SessionContext) -> Option<StateId> {
    let Some(target) = ctx.capabilities.credential else {
        return ctx.fail(TransmissionError::WriteRejected(TransportError::NotConnected));
    };
    let encoded = match ctx.credentials.as_ref() {
        Some(creds) => codec::encode_credentials(&ctx.profile, creds),
        None => Err(TransmissionError::EncodeFailed),
    };
    let payload = match encoded {
        Ok(payload) => payload,
        Err(e) => return ctx.fail(e),
    };

    ctx.progress("Sending WiFi credentials...");
    if let Some(creds) = ctx.credentials.as_ref() {
        info!("writing credentials for SSID '{}'", creds.ssid());
    }
    if !ctx.request_on_link(move |link| TransportRequest::WriteCredentials {
        link,
        characteristic: target,
        payload,
    }) {
        return ctx.fail(TransmissionError::WriteRejected(TransportError::NotConnected));
    }
    None
}

fn sending_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<StateId> {
    match input {
        SessionInput::Cancel => cancelled(ctx),
        SessionInput::Transport(TransportEvent::CharacteristicWritten(Ok(()))) => {
            // Dropping the payload wipes the secret.
            ctx.credentials = None;
            info!("credentials acknowledged by peripheral");
            ctx.progress("WiFi credentials sent. Waiting for connection...");
            let settle = ctx.config.status_settle();
            let window = ctx.config.completion_assumed();
            ctx.arm(TimerKind::StatusSettle, settle);
            ctx.arm(TimerKind::CompletionAssumed, window);
            Some(StateId::AwaitingSettle)
        }
        SessionInput::Transport(TransportEvent::CharacteristicWritten(Err(status))) => {
            error!("credential write failed with status {}", status.code());
            ctx.fail(TransmissionError::WriteFailed(*status))
        }
        SessionInput::Rejected(RequestKind::WriteCredentials, err) => {
            ctx.fail(TransmissionError::WriteRejected(*err))
        }
        SessionInput::Transport(TransportEvent::Disconnected(status)) => {
            connection_lost(ctx, TransportError::Disconnected(*status))
        }
        other => ignored("CredentialSending", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  AWAITING_SETTLE
// ═══════════════════════════════════════════════════════════════════════════

fn settle_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<StateId> {
    match input {
        SessionInput::Cancel => cancelled(ctx),
        SessionInput::TimerFired(TimerKind::StatusSettle) => {
            read_status(ctx);
            Some(StateId::StatusPolling)
        }
        SessionInput::Transport(TransportEvent::Notification(bytes)) => {
            observe_status(ctx, bytes, false)
        }
        SessionInput::TimerFired(TimerKind::CompletionAssumed) => assume_success(ctx),
        SessionInput::Transport(TransportEvent::Disconnected(status)) => {
            post_write_disconnect(ctx, *status)
        }
        other => ignored("AwaitingSettle", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  STATUS_POLLING
// ═══════════════════════════════════════════════════════════════════════════

fn polling_input(ctx: &mut SessionContext, input: &SessionInput) -> Option<StateId> {
    match input {
        SessionInput::Cancel => cancelled(ctx),
        SessionInput::Transport(
            TransportEvent::CharacteristicRead(Ok(bytes)) | TransportEvent::Notification(bytes),
        ) => observe_status(ctx, bytes, true),
        SessionInput::Transport(TransportEvent::CharacteristicRead(Err(status))) => {
            warn!("status read failed with status {}", status.code());
            ctx.progress(format!("Status read failed (status: {})", status.code()));
            None
        }
        SessionInput::Rejected(RequestKind::ReadStatus, err) => {
            warn!("status read rejected: {err}");
            ctx.progress(format!("Status read failed ({err})"));
            None
        }
        SessionInput::TimerFired(TimerKind::StatusPoll) => {
            read_status(ctx);
            None
        }
        SessionInput::TimerFired(TimerKind::CompletionAssumed) => assume_success(ctx),
        SessionInput::Transport(TransportEvent::Disconnected(status)) => {
            post_write_disconnect(ctx, *status)
        }
        other => ignored("StatusPolling", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Terminal states
// ═══════════════════════════════════════════════════════════════════════════

/// Cancel every timer, release the link, emit the single terminal event.
///
/// `fallback` only applies when the state was entered without a recorded
/// outcome (a forced jump).
fn finish(ctx: &mut SessionContext, fallback: impl FnOnce() -> ProvisioningEvent) {
    ctx.cancel_all();
    ctx.release();
    ctx.credentials = None;
    ctx.emit_terminal(fallback);
}

fn success_enter(ctx: &mut SessionContext) -> Option<StateId> {
    info!("provisioning of {} succeeded", ctx.peripheral);
    let peripheral = ctx.peripheral.clone();
    finish(ctx, move || {
        ProvisioningEvent::Success(ProvisionedDevice {
            peripheral,
            ip_address: None,
            device_id: None,
        })
    });
    None
}

fn failed_enter(ctx: &mut SessionContext) -> Option<StateId> {
    error!("provisioning of {} failed", ctx.peripheral);
    finish(ctx, || ProvisioningEvent::Failed(ProvisioningError::Cancelled));
    None
}

fn errored_enter(ctx: &mut SessionContext) -> Option<StateId> {
    error!("provisioning of {} aborted with an error", ctx.peripheral);
    finish(ctx, || {
        ProvisioningEvent::Error(ProvisioningError::Transport(TransportError::NotConnected))
    });
    None
}

fn terminal_input(_ctx: &mut SessionContext, input: &SessionInput) -> Option<StateId> {
    debug!("terminal: discarding {input:?}");
    None
}
