//! wifiprov-sim: provision a simulated ESP32 over a scripted GATT link.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimulatedPeripheral   LogEventSink   MemoryDeviceStore        │
//! │  (GattTransport)       (EventSink)    (DeviceStore)            │
//! │  ManualClock (ClockPort, virtual time)                         │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │        ProvisioningSupervisor (pure logic)             │    │
//! │  │  GattSession FSM · RetryPolicy · TimeoutScheduler      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Virtual time jumps straight to the next event, so a session that would
//! take fifteen seconds on a real radio finishes instantly.
#![deny(unused_must_use)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use log::{info, warn};

use wifiprov::adapters::log_sink::LogEventSink;
use wifiprov::adapters::sim::{Scenario, SimulatedPeripheral, run_until_idle};
use wifiprov::adapters::store::{MemoryDeviceStore, record_outcome};
use wifiprov::adapters::time::ManualClock;
use wifiprov::app::ports::{ClockPort, DeviceStore, EventSink};
use wifiprov::{
    FirmwareGeneration, ProvisionRequest, ProvisioningConfig, ProvisioningEvent,
    ProvisioningSupervisor,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScenarioArg {
    HappyPath,
    SilentPeripheral,
    FlakyConnect,
    MissingStatusCharacteristic,
    PeripheralFailure,
    EarlyDisconnect,
    NoAdapter,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FirmwareArg {
    Minimal,
    Legacy,
}

#[derive(Parser)]
#[command(name = "wifiprov-sim")]
#[command(about = "Provision a simulated ESP32 peripheral over BLE")]
struct Cli {
    /// Peripheral address
    #[arg(short, long, default_value = "24:6F:28:AA:BB:CC")]
    device: String,
    /// Network name to hand to the peripheral
    #[arg(short, long)]
    ssid: String,
    /// Network secret (omit for an open network)
    #[arg(short, long, default_value = "")]
    password: String,
    /// Peripheral firmware generation (overrides the config file)
    #[arg(short, long, value_enum)]
    firmware: Option<FirmwareArg>,
    /// Scripted peripheral behaviour
    #[arg(long, value_enum, default_value = "happy-path")]
    scenario: ScenarioArg,
    /// Failed connects before the peripheral answers (flaky-connect only)
    #[arg(long, default_value = "2")]
    failures: u8,
    /// JSON file with timing and retry settings
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Give up after this much virtual time
    #[arg(long, default_value = "120")]
    horizon_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ProvisioningConfig::from_json(&text)?
        }
        None => ProvisioningConfig::default(),
    };
    if let Some(firmware) = cli.firmware {
        config.firmware = match firmware {
            FirmwareArg::Minimal => FirmwareGeneration::Minimal,
            FirmwareArg::Legacy => FirmwareGeneration::Legacy,
        };
    }

    let scenario = match cli.scenario {
        ScenarioArg::HappyPath => Scenario::HappyPath,
        ScenarioArg::SilentPeripheral => Scenario::SilentPeripheral,
        ScenarioArg::FlakyConnect => Scenario::FlakyConnect {
            failures: cli.failures,
        },
        ScenarioArg::MissingStatusCharacteristic => Scenario::MissingStatusCharacteristic,
        ScenarioArg::PeripheralFailure => Scenario::PeripheralFailure,
        ScenarioArg::EarlyDisconnect => Scenario::EarlyDisconnect,
        ScenarioArg::NoAdapter => Scenario::NoAdapter,
    };

    let mut supervisor = ProvisioningSupervisor::new(config)?;
    let mut peripheral = SimulatedPeripheral::new(*supervisor.profile(), scenario);
    let clock = ManualClock::new();
    let mut sink = LogEventSink::new();
    let mut store = MemoryDeviceStore::new();
    let outcomes = supervisor.outcomes();

    info!(
        "scenario {} against {} ({})",
        scenario.name(),
        cli.device,
        supervisor.profile().generation.name()
    );

    let request = ProvisionRequest::new(cli.device, cli.ssid, cli.password);
    let session = supervisor.start(&mut peripheral, clock.now_ms(), request)?;

    let finished = run_until_idle(
        &mut supervisor,
        &mut peripheral,
        &clock,
        cli.horizon_secs.saturating_mul(1_000),
    );
    if !finished {
        warn!("horizon reached with session {session} still active");
        supervisor.teardown(&mut peripheral, clock.now_ms());
    }

    let mut succeeded = false;
    for outcome in outcomes.drain() {
        sink.emit(&outcome);
        if let Err(e) = record_outcome(&mut store, &outcome) {
            warn!("device store: {e}");
        }
        succeeded |= matches!(outcome.event, ProvisioningEvent::Success(_));
    }

    info!(
        "session {session} ended after {}ms virtual, {} outcome(s)",
        clock.now_ms(),
        sink.emitted()
    );
    if let Some((device, ip)) = store.last_provisioned() {
        info!("last provisioned: {device} at {ip}");
    }

    if !succeeded {
        bail!("provisioning did not succeed");
    }
    Ok(())
}
