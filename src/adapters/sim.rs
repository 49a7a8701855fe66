//! Simulated ESP32 provisioning peripheral.
//!
//! Implements [`GattTransport`] with an in-process model of the peripheral
//! firmware: it serves the profile's GATT database, accepts the CCCD
//! write, decodes the credential JSON, and walks its status through
//! `ready → connecting → connected` (or a scripted failure), notifying
//! when notifications are armed and answering reads otherwise.
//!
//! Completions are not delivered synchronously.  Each one is queued with a
//! virtual due time and handed out by [`SimulatedPeripheral::poll_events`],
//! so the supervisor sees the same out-of-band callback shape a real GATT
//! stack produces.
//!
//! ```text
//!  supervisor ──request──▶ SimulatedPeripheral ──(due, link, event)──▶ queue
//!      ▲                                                              │
//!      └──────────── on_transport_event ◀── poll_events(now) ◀────────┘
//! ```

use std::collections::BTreeMap;

use log::{debug, info};
use uuid::Uuid;

use crate::adapters::time::ManualClock;
use crate::app::events::{
    CharacteristicRef, GattCharacteristic, GattService, GattStatus, LinkId, PeripheralId,
    TransportEvent,
};
use crate::app::ports::{ClockPort, GattTransport};
use crate::app::supervisor::ProvisioningSupervisor;
use crate::codec::{self, StatusReport, StatusTag};
use crate::error::TransportError;
use crate::profile::{ENABLE_NOTIFICATION, ProtocolProfile, short_uuid};

/// Generic Access and Generic Attribute, present on every peripheral.
const GAP_SERVICE: u16 = 0x1800;
const GATT_SERVICE: u16 = 0x1801;

/// Status a Bluedroid stack reports for a failed connect.
pub const GATT_ERROR: GattStatus = GattStatus::new(133);
/// Remote user terminated connection.
pub const REMOTE_TERMINATED: GattStatus = GattStatus::new(19);
/// Invalid attribute value length.
pub const INVALID_LENGTH: GattStatus = GattStatus::new(13);

// ───────────────────────────────────────────────────────────────
// Scenarios
// ───────────────────────────────────────────────────────────────

/// Scripted peripheral behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Joins the network and reports its IP.
    HappyPath,
    /// Accepts the credentials, then never answers a read or notifies.
    SilentPeripheral,
    /// The first `failures` connection attempts fail with status 133.
    FlakyConnect { failures: u8 },
    /// Provisioning service lacks the status characteristic.
    MissingStatusCharacteristic,
    /// Reports `failed` with a reason after trying to join.
    PeripheralFailure,
    /// Drops the link right after acknowledging the credentials.
    EarlyDisconnect,
    /// No radio available: every connect is refused.
    NoAdapter,
}

impl Scenario {
    pub fn name(self) -> &'static str {
        match self {
            Self::HappyPath => "happy-path",
            Self::SilentPeripheral => "silent-peripheral",
            Self::FlakyConnect { .. } => "flaky-connect",
            Self::MissingStatusCharacteristic => "missing-status-characteristic",
            Self::PeripheralFailure => "peripheral-failure",
            Self::EarlyDisconnect => "early-disconnect",
            Self::NoAdapter => "no-adapter",
        }
    }
}

/// One recorded transport call.  Credential payloads are recorded by length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    Connect(LinkId),
    DiscoverServices(LinkId),
    SetNotifications(LinkId, bool),
    WriteDescriptor(LinkId, Uuid),
    WriteCharacteristic(LinkId, usize),
    ReadCharacteristic(LinkId),
    Disconnect(LinkId),
    Close(LinkId),
}

/// Work queued for a future virtual time.
#[derive(Debug)]
enum Pending {
    Deliver(LinkId, TransportEvent),
    /// Peripheral-side status change; notifies if armed.
    Status(StatusReport),
    /// Peripheral drops the link on its own.
    DropLink(LinkId, GattStatus),
}

// ───────────────────────────────────────────────────────────────
// SimulatedPeripheral
// ───────────────────────────────────────────────────────────────

pub struct SimulatedPeripheral {
    profile: ProtocolProfile,
    scenario: Scenario,
    /// Delay before any completion is delivered.
    latency_ms: u64,
    /// Time the peripheral needs to join the network.
    join_ms: u64,
    ip_address: String,
    device_id: String,

    now_ms: u64,
    seq: u64,
    queue: BTreeMap<(u64, u64), Pending>,

    next_link: u32,
    open_links: Vec<LinkId>,
    connect_attempts: u32,
    notifying: bool,
    status: StatusReport,
    received_ssid: Option<String>,
    calls: Vec<SimCall>,
}

impl SimulatedPeripheral {
    pub fn new(profile: ProtocolProfile, scenario: Scenario) -> Self {
        Self {
            profile,
            scenario,
            latency_ms: 50,
            join_ms: 4_000,
            ip_address: "192.168.1.42".to_owned(),
            device_id: "ESP32-Sim".to_owned(),
            now_ms: 0,
            seq: 0,
            queue: BTreeMap::new(),
            next_link: 0,
            open_links: Vec::new(),
            connect_attempts: 0,
            notifying: false,
            status: StatusReport::new(StatusTag::Ready).with_message("Waiting for credentials"),
            received_ssid: None,
            calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_latency_ms(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    #[must_use]
    pub fn with_join_ms(mut self, ms: u64) -> Self {
        self.join_ms = ms;
        self
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    /// Every transport call, in order.
    pub fn calls(&self) -> &[SimCall] {
        &self.calls
    }

    /// Links that were disconnected, in order.
    pub fn releases(&self) -> Vec<LinkId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SimCall::Disconnect(link) => Some(*link),
                _ => None,
            })
            .collect()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    pub fn credential_writes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, SimCall::WriteCharacteristic(..)))
            .count()
    }

    /// SSID decoded from the last conforming credential write.
    pub fn received_ssid(&self) -> Option<&str> {
        self.received_ssid.as_deref()
    }

    pub fn is_notifying(&self) -> bool {
        self.notifying
    }

    pub fn open_links(&self) -> &[LinkId] {
        &self.open_links
    }

    /// Virtual time of the next queued completion.
    pub fn next_event_ms(&self) -> Option<u64> {
        self.queue.keys().next().map(|&(due, _)| due)
    }

    /// Advance to `now_ms` and return every completion due by then.
    pub fn poll_events(&mut self, now_ms: u64) -> Vec<(LinkId, TransportEvent)> {
        self.now_ms = self.now_ms.max(now_ms);
        let mut out = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > self.now_ms {
                break;
            }
            match entry.remove() {
                Pending::Deliver(link, event) => out.push((link, event)),
                Pending::Status(report) => self.set_status(report, &mut out),
                Pending::DropLink(link, status) => {
                    if self.close_link(link) {
                        info!("sim: peripheral dropped link {link:?}");
                        out.push((link, TransportEvent::Disconnected(status)));
                    }
                }
            }
        }
        out
    }

    // ── Internal ──────────────────────────────────────────────

    fn schedule(&mut self, delay_ms: u64, item: Pending) {
        self.seq += 1;
        self.queue.insert((self.now_ms + delay_ms, self.seq), item);
    }

    fn deliver(&mut self, link: LinkId, event: TransportEvent) {
        let latency = self.latency_ms;
        self.schedule(latency, Pending::Deliver(link, event));
    }

    fn set_status(&mut self, report: StatusReport, out: &mut Vec<(LinkId, TransportEvent)>) {
        debug!("sim: status -> {}", report.raw_status);
        self.status = report;
        if !self.notifying || matches!(self.scenario, Scenario::SilentPeripheral) {
            return;
        }
        let bytes = codec::encode_status(&self.profile, &self.status);
        for link in &self.open_links {
            out.push((*link, TransportEvent::Notification(bytes.clone())));
        }
    }

    fn ensure_open(&self, link: LinkId) -> Result<(), TransportError> {
        if self.open_links.contains(&link) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn close_link(&mut self, link: LinkId) -> bool {
        let before = self.open_links.len();
        self.open_links.retain(|l| *l != link);
        if self.open_links.is_empty() {
            self.notifying = false;
        }
        self.open_links.len() != before
    }

    fn database(&self) -> Vec<GattService> {
        let p = &self.profile;
        let mut characteristics = vec![GattCharacteristic::new(p.credential_char)];
        if !matches!(self.scenario, Scenario::MissingStatusCharacteristic) {
            characteristics.push(GattCharacteristic::new(p.status_char).with_descriptor(p.cccd));
        }
        if let Some(aux) = p.auxiliary_char {
            characteristics.push(GattCharacteristic::new(aux));
        }
        vec![
            GattService {
                uuid: short_uuid(GAP_SERVICE),
                characteristics: vec![GattCharacteristic::new(short_uuid(0x2a00))],
            },
            GattService {
                uuid: short_uuid(GATT_SERVICE),
                characteristics: Vec::new(),
            },
            GattService {
                uuid: p.service,
                characteristics,
            },
        ]
    }

    /// Peripheral reaction to an accepted credential write.
    fn begin_join(&mut self, link: LinkId) {
        let latency = self.latency_ms;
        let join = self.join_ms;
        match self.scenario {
            Scenario::EarlyDisconnect => {
                self.schedule(latency * 2, Pending::DropLink(link, REMOTE_TERMINATED));
                self.schedule(
                    join,
                    Pending::Status(self.connected_report()),
                );
            }
            Scenario::PeripheralFailure => {
                self.schedule(latency * 2, Pending::Status(StatusReport::new(StatusTag::Connecting)));
                self.schedule(
                    join,
                    Pending::Status(
                        StatusReport::new(StatusTag::Failed).with_message("Authentication failed"),
                    ),
                );
            }
            _ => {
                self.schedule(latency * 2, Pending::Status(StatusReport::new(StatusTag::Connecting)));
                self.schedule(join, Pending::Status(self.connected_report()));
            }
        }
    }

    fn connected_report(&self) -> StatusReport {
        let mut report = StatusReport::new(StatusTag::Connected)
            .with_message("WiFi connected")
            .with_ip(self.ip_address.clone())
            .with_device_id(self.device_id.clone());
        report.rssi = Some(-52);
        report
    }
}

impl GattTransport for SimulatedPeripheral {
    fn connect(&mut self, peripheral: &PeripheralId) -> Result<LinkId, TransportError> {
        if matches!(self.scenario, Scenario::NoAdapter) {
            return Err(TransportError::Unavailable);
        }
        self.connect_attempts += 1;
        self.next_link += 1;
        let link = LinkId(self.next_link);
        self.calls.push(SimCall::Connect(link));
        info!("sim: connect #{} to {peripheral} -> {link:?}", self.connect_attempts);

        match self.scenario {
            Scenario::FlakyConnect { failures } if self.connect_attempts <= u32::from(failures) => {
                self.deliver(link, TransportEvent::ConnectFailed(GATT_ERROR));
            }
            _ => {
                self.open_links.push(link);
                self.deliver(link, TransportEvent::Connected);
            }
        }
        Ok(link)
    }

    fn discover_services(&mut self, link: LinkId) -> Result<(), TransportError> {
        self.ensure_open(link)?;
        self.calls.push(SimCall::DiscoverServices(link));
        let db = self.database();
        self.deliver(link, TransportEvent::ServicesDiscovered(Ok(db)));
        Ok(())
    }

    fn set_notifications(
        &mut self,
        link: LinkId,
        _characteristic: &CharacteristicRef,
        enable: bool,
    ) -> Result<(), TransportError> {
        self.ensure_open(link)?;
        self.calls.push(SimCall::SetNotifications(link, enable));
        Ok(())
    }

    fn write_descriptor(
        &mut self,
        link: LinkId,
        characteristic: &CharacteristicRef,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError> {
        self.ensure_open(link)?;
        self.calls.push(SimCall::WriteDescriptor(link, descriptor));
        if characteristic.characteristic == self.profile.status_char
            && descriptor == self.profile.cccd
            && value == ENABLE_NOTIFICATION
        {
            self.notifying = true;
            self.deliver(link, TransportEvent::DescriptorWritten(Ok(())));
        } else {
            self.deliver(link, TransportEvent::DescriptorWritten(Err(INVALID_LENGTH)));
        }
        Ok(())
    }

    fn write_characteristic(
        &mut self,
        link: LinkId,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> Result<(), TransportError> {
        self.ensure_open(link)?;
        self.calls.push(SimCall::WriteCharacteristic(link, value.len()));
        if characteristic.characteristic != self.profile.credential_char {
            return Err(TransportError::Rejected);
        }

        let Some(received) = codec::decode_credentials(&self.profile, value) else {
            self.deliver(link, TransportEvent::CharacteristicWritten(Err(INVALID_LENGTH)));
            return Ok(());
        };
        info!("sim: received credentials for SSID '{}'", received.ssid);
        self.received_ssid = Some(received.ssid.clone());
        self.deliver(link, TransportEvent::CharacteristicWritten(Ok(())));
        self.begin_join(link);
        Ok(())
    }

    fn read_characteristic(
        &mut self,
        link: LinkId,
        _characteristic: &CharacteristicRef,
    ) -> Result<(), TransportError> {
        self.ensure_open(link)?;
        self.calls.push(SimCall::ReadCharacteristic(link));
        if matches!(self.scenario, Scenario::SilentPeripheral) {
            debug!("sim: swallowing status read");
            return Ok(());
        }
        let bytes = codec::encode_status(&self.profile, &self.status);
        self.deliver(link, TransportEvent::CharacteristicRead(Ok(bytes)));
        Ok(())
    }

    fn disconnect(&mut self, link: LinkId) {
        self.calls.push(SimCall::Disconnect(link));
        if self.close_link(link) {
            self.deliver(link, TransportEvent::Disconnected(GattStatus::SUCCESS));
        }
    }

    fn close(&mut self, link: LinkId) {
        self.calls.push(SimCall::Close(link));
    }
}

// ───────────────────────────────────────────────────────────────
// Virtual-time driver
// ───────────────────────────────────────────────────────────────

/// Run the supervisor against `sim` on virtual time until it goes idle.
///
/// The clock jumps straight to the next peripheral completion or
/// supervisor deadline.  Returns `false` if `horizon_ms` passes first or
/// nothing is left to happen while a session is still active.
pub fn run_until_idle(
    supervisor: &mut ProvisioningSupervisor,
    sim: &mut SimulatedPeripheral,
    clock: &ManualClock,
    horizon_ms: u64,
) -> bool {
    loop {
        let now = clock.now_ms();
        loop {
            let due = sim.poll_events(now);
            if due.is_empty() {
                break;
            }
            for (link, event) in due {
                supervisor.on_transport_event(sim, now, link, event);
            }
        }
        supervisor.tick(sim, now);
        if !supervisor.is_active() {
            return true;
        }

        let next = match (sim.next_event_ms(), supervisor.next_deadline_ms()) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => {
                debug!("sim: nothing left to happen at {now}ms");
                return false;
            }
        };
        if next > horizon_ms {
            return false;
        }
        clock.set(next);
    }
}
