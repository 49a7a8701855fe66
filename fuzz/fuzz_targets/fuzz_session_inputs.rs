//! Fuzz target: `GattSession::handle`
//!
//! Interprets the input as a stream of session inputs and checks that a
//! session never emits more than one terminal event and goes silent once
//! terminal.
//!
//! cargo fuzz run fuzz_session_inputs

#![no_main]

use libfuzzer_sys::fuzz_target;
use wifiprov::app::events::{GattStatus, LinkId, PeripheralId, SessionId, TransportEvent};
use wifiprov::app::session::{Action, GattSession, SessionInput};
use wifiprov::credentials::CredentialPayload;
use wifiprov::profile::ProtocolProfile;
use wifiprov::timers::TimerKind;
use wifiprov::ProvisioningConfig;

fn input(op: u8, arg: u8, next_link: &mut u32) -> SessionInput {
    let status = GattStatus::new(arg);
    match op % 10 {
        0 => SessionInput::Cancel,
        1 => {
            *next_link += 1;
            SessionInput::LinkOpened(LinkId(*next_link))
        }
        2 => SessionInput::TimerFired(TimerKind::ALL[usize::from(arg) % TimerKind::COUNT]),
        3 => SessionInput::Transport(TransportEvent::Connected),
        4 => SessionInput::Transport(TransportEvent::Disconnected(status)),
        5 => SessionInput::Transport(TransportEvent::ConnectFailed(status)),
        6 => SessionInput::Transport(TransportEvent::DescriptorWritten(Ok(()))),
        7 => SessionInput::Transport(TransportEvent::CharacteristicWritten(Ok(()))),
        8 => SessionInput::Transport(TransportEvent::Notification(vec![arg; usize::from(arg % 8)])),
        _ => SessionInput::Transport(TransportEvent::CharacteristicRead(Err(status))),
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(credentials) = CredentialPayload::new("FuzzNet", "password123") else {
        return;
    };
    let mut session = GattSession::new(
        SessionId(1),
        &ProvisioningConfig::default(),
        ProtocolProfile::esp32_minimal(),
        PeripheralId::new("00:11:22:33:44:55"),
        credentials,
    );
    session.handle(SessionInput::Start);

    let mut next_link = 0;
    let mut terminals = 0;
    for pair in data.chunks_exact(2) {
        let was_terminal = session.is_terminal();
        let actions = session.handle(input(pair[0], pair[1], &mut next_link));
        if was_terminal {
            assert!(actions.is_empty());
        }
        terminals += actions
            .iter()
            .filter(|a| matches!(a, Action::Emit(e) if e.is_terminal()))
            .count();
    }
    assert!(terminals <= 1);
});
