//! CellNode — main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimModem / modem     SimBroker / broker    Indicator pins     │
//! │  (Connectivity,Radio, (BrokerPort)          (IndicatorPort)    │
//! │   Scan,Device,Time)                                            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │ Tasks: Indicator · Registration · Session · Signal ·   │    │
//! │  │        Scan          (one worker thread + inbox each)  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  TaskRegistry (start_all / tiered stop_all) · ControlRouter    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The host build runs against the simulated modem and loopback broker
//! and accepts control commands (`MEASURE_NOW`, `NETWORK_SCAN`,
//! `SHUTDOWN`) on stdin.
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::Result;
use log::{LevelFilter, error, info, warn};

use cellnode::adapters::log_sink::DeviceLogger;
use cellnode::adapters::sim::{SimBroker, SimModem};
use cellnode::app::control::ControlRouter;
use cellnode::app::device::open_device;
use cellnode::config::AppConfig;
use cellnode::error::Error;
use cellnode::runtime::{AppContext, StopTier, TaskRegistry};
use cellnode::status::ApplicationStatus;
use cellnode::tasks::indicator::IndicatorTask;
use cellnode::tasks::registration::RegistrationTask;
use cellnode::tasks::scan::ScanTask;
use cellnode::tasks::session::SessionTask;
use cellnode::tasks::signal::SignalTask;

/// Path of an optional JSON config file.
const CONFIG_ENV: &str = "CELLNODE_CONFIG";
const SIM_SERIAL: &str = "351234567890123";

// ── Config ────────────────────────────────────────────────────

/// Defaults when no file is named; an unreadable or invalid file is an error.
fn load_config(path: Option<&str>) -> cellnode::error::Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };
    let json = std::fs::read_to_string(path).map_err(|_| Error::ConfigurationInvalid("config file unreadable"))?;
    AppConfig::from_json(&json)
}

fn host_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ── Board (ESP-IDF only) ──────────────────────────────────────

#[cfg(feature = "espidf")]
mod board {
    use std::sync::Arc;
    use std::time::Duration;

    use esp_idf_svc::hal::gpio::{AnyInputPin, AnyOutputPin, Input, InputPin, Output, OutputPin, PinDriver, Pull};
    use esp_idf_svc::hal::peripherals::Peripherals;
    use log::warn;

    use cellnode::app::control::ControlRouter;
    use cellnode::drivers::button::ButtonDriver;
    use cellnode::drivers::status_led::PinIndicator;
    use cellnode::runtime::AppContext;

    pub type Led = PinDriver<'static, AnyOutputPin, Output>;
    pub type Button = PinDriver<'static, AnyInputPin, Input>;

    const BUTTON_POLL: Duration = Duration::from_millis(10);

    pub fn take() -> anyhow::Result<(PinIndicator<Led>, ButtonDriver<Button>)> {
        let p = Peripherals::take()?;
        let indicator = PinIndicator::new(
            PinDriver::output(p.pins.gpio25.downgrade_output())?,
            PinDriver::output(p.pins.gpio26.downgrade_output())?,
            PinDriver::output(p.pins.gpio27.downgrade_output())?,
        );
        let mut button = PinDriver::input(p.pins.gpio0.downgrade_input())?;
        button.set_pull(Pull::Up)?;
        Ok((indicator, ButtonDriver::new(button)))
    }

    /// Poll the button until shutdown, routing gestures to the control plane.
    pub fn spawn_button_poller(mut button: ButtonDriver<Button>, ctx: Arc<AppContext>, router: ControlRouter) {
        let spawned = std::thread::Builder::new()
            .name("button".into())
            .stack_size(8 * 1024)
            .spawn(move || {
                while !ctx.shutdown.is_requested() {
                    if let Some(event) = button.poll(ctx.clock.uptime_ms_u32()) {
                        if let Err(e) = router.execute(event.command()) {
                            warn!("Button {:?} dropped: {}", event, e);
                        }
                    }
                    std::thread::sleep(BUTTON_POLL);
                }
            });
        if let Err(e) = spawned {
            warn!("Button poller not started: {}", e);
        }
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Bootstrap ──────────────────────────────────────────
    #[cfg(feature = "espidf")]
    esp_idf_svc::sys::link_patches();

    let config_path = std::env::var(CONFIG_ENV).ok();
    let (config, config_check) = match load_config(config_path.as_deref()) {
        Ok(config) => (config, Ok(())),
        // Defaults keep the indicator running long enough to show the error.
        Err(e) => (AppConfig::default(), Err(e)),
    };
    let ctx = AppContext::new(config);
    DeviceLogger::new(Arc::clone(&ctx), LevelFilter::Info).install()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  CellNode v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");
    match (&config_path, &config_check) {
        (Some(path), Ok(())) => info!("Config loaded from {}", path),
        (Some(path), Err(e)) => error!("Config {} rejected: {}", path, e),
        (None, _) => info!("Using default config"),
    }
    ctx.status.set(ApplicationStatus::Initializing);

    // ── 2. Collaborators ──────────────────────────────────────
    let modem = SimModem::new(SIM_SERIAL).with_time_server(Ok(host_unix_time()));
    let broker = SimBroker::new();

    #[cfg(feature = "espidf")]
    let (indicator_port, button) = board::take()?;
    #[cfg(not(feature = "espidf"))]
    let indicator_port = cellnode::adapters::console::ConsoleIndicator::new();

    // ── 3. Tasks ──────────────────────────────────────────────
    let mut registry = TaskRegistry::new(Arc::clone(&ctx));
    let indicator = IndicatorTask::new(Arc::clone(&ctx), indicator_port);
    registry.register(indicator, StopTier::Indicator);

    let mut device = modem.clone();
    let started = match config_check.and_then(|()| open_device(&mut device, &ctx.config.device_serial)) {
        Ok(serial) => {
            let registration = RegistrationTask::new(Arc::clone(&ctx), modem.clone(), modem.clone());
            let mut session = SessionTask::new(Arc::clone(&ctx), broker, &serial);
            let signal = SignalTask::new(Arc::clone(&ctx), modem.clone(), session.handle(), &serial);
            let scan = ScanTask::new(Arc::clone(&ctx), modem, session.handle(), &serial);

            let router = ControlRouter::new(ctx.shutdown.clone(), signal.inbox(), scan.inbox());
            session.set_control_router(router.clone());
            info!("Control topic: {}", session.control_topic());

            registry.register(registration, StopTier::Network);
            registry.register(session, StopTier::Consumer);
            registry.register(signal, StopTier::Consumer);
            registry.register(scan, StopTier::Consumer);

            #[cfg(feature = "espidf")]
            board::spawn_button_poller(button, Arc::clone(&ctx), router.clone());
            #[cfg(not(feature = "espidf"))]
            spawn_stdin_reader(router);

            registry.start_all()
        }
        Err(e) => registry.start_degraded(e),
    };

    // ── 4. Run until shutdown, then stop tier by tier ─────────
    if let Err(e) = registry.run_until_shutdown(started) {
        warn!("Shutdown incomplete: {}", e);
    }
    info!("Application finished.");
    Ok(())
}

/// Feed stdin lines to the control plane (host build).
#[cfg(not(feature = "espidf"))]
fn spawn_stdin_reader(router: ControlRouter) {
    let spawned = std::thread::Builder::new().name("stdin".into()).spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => router.handle_text(&line),
                Err(_) => break,
            }
        }
    });
    if let Err(e) = spawned {
        warn!("Control input not available: {}", e);
    }
}
