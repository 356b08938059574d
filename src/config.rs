//! Runtime configuration parameters
//!
//! All tunable parameters for the CellNode runtime.  Values come from the
//! defaults below, optionally overridden by a JSON document.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 2023-01-01T00:00:00Z.  Network time earlier than this is treated as unset.
pub const DEFAULT_TIME_SANITY_EPOCH: i64 = 1_672_531_200;

/// Core runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // --- Device ---
    /// Serial number override; when empty the modem's own serial is used.
    pub device_serial: String,

    // --- Network registration ---
    /// Access point name handed to the connectivity layer
    pub apn: String,
    /// Seconds between registration checks / bring-up retries
    pub network_dwell_secs: u32,
    /// Per-attempt bring-up timeout handed to the connectivity layer (seconds)
    pub bring_up_timeout_secs: u32,

    // --- Time ---
    /// Unix time below which a network-provided clock is considered bogus
    pub time_sanity_epoch: i64,
    /// Host queried when network time is implausible
    pub time_server: String,

    // --- Messaging session ---
    pub broker_name: String,
    pub broker_username: String,
    pub broker_password: String,
    /// Seconds between session liveness checks
    pub session_dwell_secs: u32,

    // --- Signal report ---
    /// Seconds between signal quality reports
    pub signal_report_dwell_secs: u32,

    // --- Timing ---
    /// Status indicator tick (milliseconds)
    pub indicator_tick_ms: u32,
    /// Granularity of every dwell loop (milliseconds)
    pub dwell_slice_ms: u32,
    /// Sleep between "is it stopped yet" polls during shutdown (milliseconds)
    pub shutdown_poll_ms: u32,
    /// Polls per shutdown tier before the stuck tasks are reported
    pub max_shutdown_polls: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_serial: String::new(),

            apn: "apn-name".into(),
            network_dwell_secs: 30,
            bring_up_timeout_secs: 240,

            time_sanity_epoch: DEFAULT_TIME_SANITY_EPOCH,
            time_server: "time.google.com".into(),

            broker_name: "broker.local".into(),
            broker_username: "username".into(),
            broker_password: "password".into(),
            session_dwell_secs: 30,

            signal_report_dwell_secs: 30,

            indicator_tick_ms: 10,
            dwell_slice_ms: 100,
            shutdown_poll_ms: 2000,
            max_shutdown_polls: 30,
        }
    }
}

impl AppConfig {
    /// Parse a JSON document (missing fields take their defaults) and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|_| Error::ConfigurationInvalid("config is not valid JSON"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.indicator_tick_ms == 0 {
            return Err(Error::ConfigurationInvalid("indicator_tick_ms must be > 0"));
        }
        if self.dwell_slice_ms == 0 {
            return Err(Error::ConfigurationInvalid("dwell_slice_ms must be > 0"));
        }
        let shortest_dwell_ms = self
            .network_dwell_secs
            .min(self.session_dwell_secs)
            .min(self.signal_report_dwell_secs)
            .saturating_mul(1000);
        if shortest_dwell_ms < self.dwell_slice_ms {
            return Err(Error::ConfigurationInvalid("dwell shorter than dwell slice"));
        }
        if self.bring_up_timeout_secs == 0 {
            return Err(Error::ConfigurationInvalid("bring_up_timeout_secs must be > 0"));
        }
        if self.broker_name.is_empty() {
            return Err(Error::ConfigurationInvalid("broker_name is empty"));
        }
        if self.apn.is_empty() {
            return Err(Error::ConfigurationInvalid("apn is empty"));
        }
        if self.shutdown_poll_ms == 0 || self.max_shutdown_polls == 0 {
            return Err(Error::ConfigurationInvalid("shutdown polling disabled"));
        }
        if self.time_sanity_epoch <= 0 {
            return Err(Error::ConfigurationInvalid("time_sanity_epoch must be positive"));
        }
        Ok(())
    }
}
