//! Port traits — the boundary between the task runtime and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Task worker (owns the port)
//! ```
//!
//! Every external collaborator (connectivity stack, radio, broker client,
//! indicator hardware) is reached through one of these traits.  Each
//! port instance is moved into exactly one task's worker thread, so the
//! traits take `&mut self` and only require `Send`.
//!
//! Callbacks registered on a port may fire on any thread; they must only
//! touch atomics or send to an [`EventQueue`](crate::events::EventQueue).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ───────────────────────────────────────────────────────────────
// Connectivity (network registration)
// ───────────────────────────────────────────────────────────────

/// Parameters handed to [`ConnectivityPort::bring_up`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringUpConfig {
    pub apn: String,
    /// The connectivity layer gives up on its own after this long.
    pub timeout: Duration,
}

/// Link status callback: `true` when the network came up, `false` when lost.
pub type StatusCallback = Box<dyn Fn(bool) + Send + Sync>;

pub trait ConnectivityPort: Send {
    /// Register on the network.  Polls `keep_going` between sub-steps and
    /// abandons the attempt when it returns `false`.
    fn bring_up(&mut self, config: &BringUpConfig, keep_going: &dyn Fn() -> bool) -> Result<()>;

    /// Deregister and drop the link.
    fn tear_down(&mut self) -> Result<()>;

    /// Install the asynchronous link status callback.
    fn set_status_callback(&mut self, callback: StatusCallback);

    /// Network-provided unix time, if the network supplied one.
    fn network_time(&mut self) -> Option<i64>;
}

/// Fallback wall-clock source queried over the network.
pub trait TimeServerPort: Send {
    fn fetch_unix_time(&mut self, host: &str) -> Result<i64>;
}

// ───────────────────────────────────────────────────────────────
// Radio diagnostics
// ───────────────────────────────────────────────────────────────

/// Snapshot of the serving cell's signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalQuality {
    /// Reference signal received power (dBm).  Zero means "not measured".
    pub rsrp: i32,
    /// Reference signal received quality (dB).
    pub rsrq: i32,
}

pub trait RadioPort: Send {
    /// Refresh and return the current radio parameters.
    fn refresh(&mut self) -> Result<SignalQuality>;
}

/// One network found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub operator: String,
    pub mcc_mnc: String,
}

pub trait ScanPort: Send {
    /// Run a full network scan, reporting each network as it is found.
    /// Polls `keep_going` between results.  Returns the number of networks
    /// reported.
    fn scan(
        &mut self,
        keep_going: &dyn Fn() -> bool,
        on_result: &mut dyn FnMut(&ScanResult),
    ) -> Result<usize>;
}

/// The modem itself, opened once before any task starts.
pub trait DevicePort {
    fn open(&mut self) -> Result<()>;
    fn serial_number(&mut self) -> Result<String>;
}

// ───────────────────────────────────────────────────────────────
// Message broker
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub broker: String,
    pub username: String,
    pub password: String,
}

/// A message read back from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Called with the number of messages waiting to be read.
pub type MessageAvailableCallback = Box<dyn Fn(usize) + Send + Sync>;
/// Called when the broker drops the session.
pub type DisconnectCallback = Box<dyn Fn() + Send + Sync>;

pub trait BrokerPort: Send {
    fn connect(&mut self, credentials: &Credentials) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
    fn is_connected(&self) -> bool;
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<()>;
    fn subscribe(&mut self, topic: &str, max_qos: QoS) -> Result<()>;
    fn set_message_available_callback(&mut self, callback: MessageAvailableCallback);
    fn set_disconnect_callback(&mut self, callback: DisconnectCallback);
    fn read_next_message(&mut self) -> Result<InboundMessage>;
}

// ───────────────────────────────────────────────────────────────
// Status indicator
// ───────────────────────────────────────────────────────────────

/// Indicator output: one on/off channel per colour.
pub trait IndicatorPort: Send {
    fn set_channel(&mut self, index: usize, on: bool);
}
