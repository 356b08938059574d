//! Mock hardware and shared helpers for integration tests.
//!
//! The indicator mock records every channel write so tests can assert on
//! the full output history.  Modem and broker come from
//! `cellnode::adapters::sim`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cellnode::app::ports::IndicatorPort;
use cellnode::config::AppConfig;
use cellnode::drivers::led_patterns::CHANNELS;
use cellnode::runtime::AppContext;

// ── Timing ────────────────────────────────────────────────────

/// Short dwell intervals so task loops turn over quickly.
pub fn fast_config() -> AppConfig {
    AppConfig {
        network_dwell_secs: 1,
        session_dwell_secs: 1,
        signal_report_dwell_secs: 1,
        indicator_tick_ms: 5,
        dwell_slice_ms: 10,
        shutdown_poll_ms: 50,
        max_shutdown_polls: 60,
        ..AppConfig::default()
    }
}

pub fn fast_context() -> Arc<AppContext> {
    AppContext::new(fast_config())
}

/// Poll `cond` every 5 ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub const WAIT: Duration = Duration::from_secs(5);

// ── Indicator ─────────────────────────────────────────────────

/// Clonable indicator that records `(channel, on)` writes.
#[derive(Clone, Default)]
pub struct RecordingIndicator {
    writes: Arc<Mutex<Vec<(usize, bool)>>>,
}

#[allow(dead_code)]
impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(usize, bool)> {
        self.writes.lock().unwrap().clone()
    }

    /// Last value written to each channel (`false` if never written).
    pub fn current(&self) -> [bool; CHANNELS] {
        let mut state = [false; CHANNELS];
        for (channel, on) in self.writes() {
            state[channel] = on;
        }
        state
    }
}

impl IndicatorPort for RecordingIndicator {
    fn set_channel(&mut self, index: usize, on: bool) {
        self.writes.lock().unwrap().push((index, on));
    }
}
