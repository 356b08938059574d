//! Simulated modem and loopback broker.
//!
//! Lets the binary run end-to-end on a workstation and gives the
//! integration tests collaborators with scriptable failures.  Both types
//! are cheap `Clone` handles over shared state, so a test can keep one
//! copy for inspection while the task owns the other.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};

use crate::app::ports::{
    BringUpConfig, BrokerPort, ConnectivityPort, Credentials, DevicePort, InboundMessage, QoS, RadioPort,
    ScanPort, ScanResult, SignalQuality, TimeServerPort,
};
use crate::error::{Error, Result};

/// Simulated latency of one modem operation step.
const SIM_STEP: Duration = Duration::from_millis(10);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// Modem
// ───────────────────────────────────────────────────────────────

type LinkCallback = Arc<dyn Fn(bool) + Send + Sync>;

struct ModemState {
    serial: String,
    opened: bool,
    up: bool,
    bring_up_attempts: u32,
    /// Bring-up attempts that fail before one succeeds.
    failures_left: u32,
    network_time: Option<i64>,
    time_server: Result<i64>,
    time_server_queries: u32,
    signal: SignalQuality,
    networks: Vec<ScanResult>,
    scan_step: Duration,
    link_callback: Option<LinkCallback>,
}

/// One simulated cellular modem.  Implements every modem-side port.
#[derive(Clone)]
pub struct SimModem {
    state: Arc<Mutex<ModemState>>,
}

impl SimModem {
    /// The serial number is reported with surrounding quotes, as modems do.
    pub fn new(serial: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ModemState {
                serial: format!("\"{serial}\""),
                opened: false,
                up: false,
                bring_up_attempts: 0,
                failures_left: 0,
                network_time: None,
                time_server: Err(Error::NotConnected),
                time_server_queries: 0,
                signal: SignalQuality { rsrp: -97, rsrq: -10 },
                networks: vec![
                    ScanResult {
                        operator: "Sim Mobile".into(),
                        mcc_mnc: "001-01".into(),
                    },
                    ScanResult {
                        operator: "Test Net".into(),
                        mcc_mnc: "001-02".into(),
                    },
                ],
                scan_step: Duration::from_millis(200),
                link_callback: None,
            })),
        }
    }

    pub fn with_bring_up_failures(self, failures: u32) -> Self {
        lock(&self.state).failures_left = failures;
        self
    }

    pub fn with_network_time(self, time: Option<i64>) -> Self {
        lock(&self.state).network_time = time;
        self
    }

    pub fn with_time_server(self, reply: Result<i64>) -> Self {
        lock(&self.state).time_server = reply;
        self
    }

    pub fn with_signal(self, signal: SignalQuality) -> Self {
        lock(&self.state).signal = signal;
        self
    }

    pub fn with_networks(self, networks: Vec<ScanResult>, step: Duration) -> Self {
        {
            let mut s = lock(&self.state);
            s.networks = networks;
            s.scan_step = step;
        }
        self
    }

    pub fn is_up(&self) -> bool {
        lock(&self.state).up
    }

    pub fn bring_up_attempts(&self) -> u32 {
        lock(&self.state).bring_up_attempts
    }

    pub fn time_server_queries(&self) -> u32 {
        lock(&self.state).time_server_queries
    }

    /// Simulate the network dropping the link.
    pub fn drop_link(&self) {
        let callback = {
            let mut s = lock(&self.state);
            s.up = false;
            s.link_callback.clone()
        };
        warn!("Modem(sim): link lost");
        if let Some(cb) = callback {
            cb(false);
        }
    }
}

impl DevicePort for SimModem {
    fn open(&mut self) -> Result<()> {
        lock(&self.state).opened = true;
        info!("Modem(sim): opened");
        Ok(())
    }

    fn serial_number(&mut self) -> Result<String> {
        let s = lock(&self.state);
        if !s.opened {
            return Err(Error::NotConnected);
        }
        Ok(s.serial.clone())
    }
}

impl ConnectivityPort for SimModem {
    fn bring_up(&mut self, config: &BringUpConfig, keep_going: &dyn Fn() -> bool) -> Result<()> {
        let fail = {
            let mut s = lock(&self.state);
            s.bring_up_attempts += 1;
            let fail = s.failures_left > 0;
            s.failures_left = s.failures_left.saturating_sub(1);
            fail
        };
        info!("Modem(sim): attaching with APN '{}'", config.apn);

        for _ in 0..5 {
            if !keep_going() {
                return Err(Error::Timeout);
            }
            std::thread::sleep(SIM_STEP);
        }
        if fail {
            warn!("Modem(sim): simulated attach failure");
            return Err(Error::NotConnected);
        }

        let callback = {
            let mut s = lock(&self.state);
            s.up = true;
            s.link_callback.clone()
        };
        if let Some(cb) = callback {
            cb(true);
        }
        Ok(())
    }

    fn tear_down(&mut self) -> Result<()> {
        lock(&self.state).up = false;
        info!("Modem(sim): detached");
        Ok(())
    }

    fn set_status_callback(&mut self, callback: crate::app::ports::StatusCallback) {
        lock(&self.state).link_callback = Some(Arc::from(callback));
    }

    fn network_time(&mut self) -> Option<i64> {
        lock(&self.state).network_time
    }
}

impl TimeServerPort for SimModem {
    fn fetch_unix_time(&mut self, host: &str) -> Result<i64> {
        let mut s = lock(&self.state);
        s.time_server_queries += 1;
        debug!("Modem(sim): time query to {}", host);
        s.time_server
    }
}

impl RadioPort for SimModem {
    fn refresh(&mut self) -> Result<SignalQuality> {
        let s = lock(&self.state);
        if !s.opened {
            return Err(Error::NotConnected);
        }
        Ok(s.signal)
    }
}

impl ScanPort for SimModem {
    fn scan(&mut self, keep_going: &dyn Fn() -> bool, on_result: &mut dyn FnMut(&ScanResult)) -> Result<usize> {
        let (networks, step) = {
            let s = lock(&self.state);
            (s.networks.clone(), s.scan_step)
        };
        let mut found = 0;
        for network in &networks {
            if !keep_going() {
                break;
            }
            std::thread::sleep(step);
            on_result(network);
            found += 1;
        }
        Ok(found)
    }
}

// ───────────────────────────────────────────────────────────────
// Loopback broker
// ───────────────────────────────────────────────────────────────

type AvailableCallback = Arc<dyn Fn(usize) + Send + Sync>;
type DroppedCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct BrokerState {
    connected: bool,
    connect_error: Option<Error>,
    connects: u32,
    subscriptions: Vec<(String, QoS)>,
    inbound: VecDeque<InboundMessage>,
    published: Vec<(String, Vec<u8>)>,
    available: Option<AvailableCallback>,
    dropped: Option<DroppedCallback>,
}

/// Broker that delivers every publish on a subscribed topic back to the
/// subscriber.  Topic matching is exact.
#[derive(Clone, Default)]
pub struct SimBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl SimBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_connections(&self, refuse: bool) {
        lock(&self.state).connect_error = refuse.then_some(Error::NotConnected);
    }

    /// Fail every connect with `error`, e.g. rejected credentials.
    pub fn fail_connections_with(&self, error: Error) {
        lock(&self.state).connect_error = Some(error);
    }

    pub fn connects(&self) -> u32 {
        lock(&self.state).connects
    }

    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        lock(&self.state).subscriptions.clone()
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.state).published.clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Vec<u8>> {
        lock(&self.state)
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Deliver a message from "another client".  Ignores the subscription
    /// list so tests can exercise unregistered topics.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        let notify = {
            let mut s = lock(&self.state);
            s.inbound.push_back(InboundMessage {
                topic: topic.into(),
                payload: payload.to_vec(),
                qos: QoS::AtMostOnce,
            });
            s.available.clone().map(|cb| (cb, s.inbound.len()))
        };
        if let Some((cb, count)) = notify {
            cb(count);
        }
    }

    /// Simulate the broker closing the session.
    pub fn drop_session(&self) {
        let callback = {
            let mut s = lock(&self.state);
            s.connected = false;
            s.dropped.clone()
        };
        if let Some(cb) = callback {
            cb();
        }
    }
}

impl BrokerPort for SimBroker {
    fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        let mut s = lock(&self.state);
        s.connects += 1;
        if let Some(e) = s.connect_error {
            return Err(e);
        }
        s.connected = true;
        s.subscriptions.clear();
        info!("Broker(sim): {} connected to {}", credentials.username, credentials.broker);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut s = lock(&self.state);
        s.connected = false;
        s.subscriptions.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, _retain: bool) -> Result<()> {
        let notify = {
            let mut s = lock(&self.state);
            if !s.connected {
                return Err(Error::NotConnected);
            }
            s.published.push((topic.into(), payload.to_vec()));
            let subscribed = s.subscriptions.iter().find(|(t, _)| t == topic).map(|&(_, q)| q);
            match subscribed {
                Some(max_qos) => {
                    s.inbound.push_back(InboundMessage {
                        topic: topic.into(),
                        payload: payload.to_vec(),
                        qos: qos.min(max_qos),
                    });
                    s.available.clone().map(|cb| (cb, s.inbound.len()))
                }
                None => None,
            }
        };
        if let Some((cb, count)) = notify {
            cb(count);
        }
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, max_qos: QoS) -> Result<()> {
        let mut s = lock(&self.state);
        if !s.connected {
            return Err(Error::NotConnected);
        }
        if !s.subscriptions.iter().any(|(t, _)| t == topic) {
            s.subscriptions.push((topic.into(), max_qos));
        }
        Ok(())
    }

    fn set_message_available_callback(&mut self, callback: crate::app::ports::MessageAvailableCallback) {
        lock(&self.state).available = Some(Arc::from(callback));
    }

    fn set_disconnect_callback(&mut self, callback: crate::app::ports::DisconnectCallback) {
        lock(&self.state).dropped = Some(Arc::from(callback));
    }

    fn read_next_message(&mut self) -> Result<InboundMessage> {
        lock(&self.state).inbound.pop_front().ok_or(Error::Timeout)
    }
}
