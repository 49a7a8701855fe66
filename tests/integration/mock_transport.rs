//! Mock GATT transport for integration tests.
//!
//! Records every transport call so tests can assert on the full request
//! history.  Completions are never generated here: each test delivers the
//! `TransportEvent`s it wants through the supervisor, in whatever order
//! and at whatever virtual time the scenario needs.  [`Harness`] wires it
//! to a supervisor on a hand-advanced clock.

use std::collections::HashMap;

use uuid::Uuid;
use wifiprov::app::events::{
    CharacteristicRef, GattCharacteristic, GattService, LinkId, PeripheralId, ProvisioningEvent,
    SessionId, TransportEvent,
};
use wifiprov::app::ports::GattTransport;
use wifiprov::error::TransportError;
use wifiprov::outcome::OutcomeStream;
use wifiprov::profile::{CCCD_UUID, ProtocolProfile};
use wifiprov::{ProvisionRequest, ProvisioningConfig, ProvisioningSupervisor};

// ── Transport call record ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(PeripheralId),
    DiscoverServices(LinkId),
    SetNotifications { link: LinkId, enable: bool },
    WriteDescriptor { link: LinkId, descriptor: Uuid, value: Vec<u8> },
    WriteCharacteristic { link: LinkId, characteristic: Uuid, value: Vec<u8> },
    ReadCharacteristic(LinkId),
    Disconnect(LinkId),
    Close(LinkId),
}

/// Which request a scripted rejection applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    Discover,
    SetNotifications,
    WriteDescriptor,
    WriteCharacteristic,
    Read,
}

// ── MockTransport ─────────────────────────────────────────────

pub struct MockTransport {
    pub calls: Vec<TransportCall>,
    next_link: u32,
    reject: HashMap<Op, TransportError>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            next_link: 0,
            reject: HashMap::new(),
        }
    }

    /// Refuse every future `op` with `err`.
    pub fn reject(&mut self, op: Op, err: TransportError) {
        self.reject.insert(op, err);
    }

    pub fn accept(&mut self, op: Op) {
        self.reject.remove(&op);
    }

    pub fn count(&self, pred: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn connects(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Connect(_)))
    }

    pub fn releases(&self) -> Vec<LinkId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Disconnect(link) => Some(*link),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Close(_)))
    }

    pub fn credential_writes(&self) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::WriteCharacteristic { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn reads(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::ReadCharacteristic(_)))
    }

    fn check(&self, op: Op) -> Result<(), TransportError> {
        match self.reject.get(&op) {
            Some(err) => Err(*err),
            None => Ok(()),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl GattTransport for MockTransport {
    fn connect(&mut self, peripheral: &PeripheralId) -> Result<LinkId, TransportError> {
        self.check(Op::Connect)?;
        self.calls.push(TransportCall::Connect(peripheral.clone()));
        self.next_link += 1;
        Ok(LinkId(self.next_link))
    }

    fn discover_services(&mut self, link: LinkId) -> Result<(), TransportError> {
        self.check(Op::Discover)?;
        self.calls.push(TransportCall::DiscoverServices(link));
        Ok(())
    }

    fn set_notifications(
        &mut self,
        link: LinkId,
        _characteristic: &CharacteristicRef,
        enable: bool,
    ) -> Result<(), TransportError> {
        self.check(Op::SetNotifications)?;
        self.calls.push(TransportCall::SetNotifications { link, enable });
        Ok(())
    }

    fn write_descriptor(
        &mut self,
        link: LinkId,
        _characteristic: &CharacteristicRef,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError> {
        self.check(Op::WriteDescriptor)?;
        self.calls.push(TransportCall::WriteDescriptor {
            link,
            descriptor,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn write_characteristic(
        &mut self,
        link: LinkId,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> Result<(), TransportError> {
        self.check(Op::WriteCharacteristic)?;
        self.calls.push(TransportCall::WriteCharacteristic {
            link,
            characteristic: characteristic.characteristic,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn read_characteristic(
        &mut self,
        link: LinkId,
        _characteristic: &CharacteristicRef,
    ) -> Result<(), TransportError> {
        self.check(Op::Read)?;
        self.calls.push(TransportCall::ReadCharacteristic(link));
        Ok(())
    }

    fn disconnect(&mut self, link: LinkId) {
        self.calls.push(TransportCall::Disconnect(link));
    }

    fn close(&mut self, link: LinkId) {
        self.calls.push(TransportCall::Close(link));
    }
}

// ── GATT database fixtures ────────────────────────────────────

/// The provisioning service as a conforming peripheral exposes it.
pub fn database(profile: &ProtocolProfile, status: bool, cccd: bool) -> Vec<GattService> {
    let mut characteristics = vec![GattCharacteristic::new(profile.credential_char)];
    if status {
        let mut c = GattCharacteristic::new(profile.status_char);
        if cccd {
            c = c.with_descriptor(CCCD_UUID);
        }
        characteristics.push(c);
    }
    vec![GattService {
        uuid: profile.service,
        characteristics,
    }]
}

// ── Harness ───────────────────────────────────────────────────

pub const ADDR: &str = "24:6F:28:AA:BB:CC";
pub const SSID: &str = "HomeNetwork";
pub const SECRET: &str = "correct-horse-battery";

/// Supervisor + mock transport on a hand-advanced clock.
pub struct Harness {
    pub sup: ProvisioningSupervisor,
    pub transport: MockTransport,
    pub outcomes: OutcomeStream,
    pub now: u64,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(config: ProvisioningConfig) -> Self {
        let sup = ProvisioningSupervisor::new(config).unwrap();
        let outcomes = sup.outcomes();
        Self {
            sup,
            transport: MockTransport::new(),
            outcomes,
            now: 0,
        }
    }

    pub fn profile(&self) -> ProtocolProfile {
        *self.sup.profile()
    }

    pub fn start(&mut self) -> SessionId {
        self.sup
            .start(
                &mut self.transport,
                self.now,
                ProvisionRequest::new(ADDR, SSID, SECRET),
            )
            .unwrap()
    }

    /// Deliver on the active session's link.
    pub fn deliver(&mut self, event: TransportEvent) {
        let link = self.sup.active_link().expect("no active link");
        self.deliver_on(link, event);
    }

    pub fn deliver_on(&mut self, link: LinkId, event: TransportEvent) {
        self.sup
            .on_transport_event(&mut self.transport, self.now, link, event);
    }

    pub fn advance(&mut self, ms: u64) {
        self.now += ms;
        self.sup.tick(&mut self.transport, self.now);
    }

    /// Jump to the next deadline and fire it.  `false` if none is armed.
    pub fn fire_next(&mut self) -> bool {
        match self.sup.next_deadline_ms() {
            Some(at) => {
                self.now = at;
                self.sup.tick(&mut self.transport, at);
                true
            }
            None => false,
        }
    }

    pub fn events(&self) -> Vec<ProvisioningEvent> {
        self.outcomes.drain().into_iter().map(|o| o.event).collect()
    }

    /// Connect, discover, arm notifications and acknowledge the write.
    pub fn to_awaiting_status(&mut self) -> SessionId {
        let id = self.start();
        let profile = self.profile();
        self.deliver(TransportEvent::Connected);
        self.fire_next();
        self.deliver(TransportEvent::ServicesDiscovered(Ok(database(&profile, true, true))));
        self.deliver(TransportEvent::DescriptorWritten(Ok(())));
        self.fire_next();
        self.deliver(TransportEvent::CharacteristicWritten(Ok(())));
        id
    }
}

pub fn terminal(events: &[ProvisioningEvent]) -> Vec<&ProvisioningEvent> {
    events.iter().filter(|e| e.is_terminal()).collect()
}

pub fn progress(events: &[ProvisioningEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ProvisioningEvent::Progress(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}
