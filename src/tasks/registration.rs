//! Network registration supervisor.
//!
//! ```text
//!   Down ──bring_up ok──▶ Up ──status cb(false)──▶ RegistrationUnknown
//!    ▲  └─ fails: retry next dwell ◀──────────────────────┘
//! ```
//!
//! While the network is not up the supervisor calls
//! [`ConnectivityPort::bring_up`] once per dwell interval, with no limit
//! on attempts.  After the first successful bring-up it syncs the wall
//! clock: network time if plausible, otherwise the time server, at most
//! one query each.  On exit it tears the link down.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use super::SMALL_STACK;
use crate::app::ports::{BringUpConfig, ConnectivityPort, TimeServerPort};
use crate::error::{Error, Result};
use crate::events::EventQueue;
use crate::network::RegistrationPhase;
use crate::runtime::{AppContext, AppTask, Lifecycle, StopToken, TaskState, dwell};
use crate::status::ApplicationStatus;

pub const REGISTRATION_INBOX: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMsg {
    /// The connectivity layer reported a link change; re-evaluate now.
    LinkChanged { up: bool },
}

pub type RegistrationQueue = EventQueue<RegistrationMsg, REGISTRATION_INBOX>;

/// Handle a link status report from the connectivity layer.
///
/// Counts only down→up edges; a loss marks the registration unknown.
pub fn on_link_status(ctx: &AppContext, is_up: bool) -> bool {
    let edge = ctx.network.record_transition(is_up);
    info!("Network Status: {}", if is_up { "Registered" } else { "Unknown" });
    if !is_up {
        ctx.status.set(ApplicationStatus::RegistrationUnknown);
    }
    edge
}

/// Obtain wall-clock time and store it as an uptime offset.
///
/// Network time earlier than the sanity epoch is ignored and the time
/// server is asked instead, once.  Returns the unix time stored, or
/// `None` if neither source produced a plausible value.
pub fn sync_wall_clock<C, T>(ctx: &AppContext, connectivity: &mut C, time_server: &mut T) -> Option<i64>
where
    C: ConnectivityPort + ?Sized,
    T: TimeServerPort + ?Sized,
{
    let epoch = ctx.config.time_sanity_epoch;
    let time = match connectivity.network_time() {
        Some(t) if t >= epoch => Some(t),
        network => {
            debug!("Network time {:?} implausible, asking {}", network, ctx.config.time_server);
            match time_server.fetch_unix_time(&ctx.config.time_server) {
                Ok(t) if t >= epoch => Some(t),
                Ok(t) => {
                    warn!("Time server returned implausible time {}", t);
                    None
                }
                Err(e) => {
                    warn!("Time server query failed: {}", e);
                    None
                }
            }
        }
    }?;
    ctx.network.set_wall_clock(time, ctx.clock.uptime_ms());
    info!("Wall clock set: unix time {}", time);
    Some(time)
}

pub struct RegistrationTask<C, T>
where
    C: ConnectivityPort + 'static,
    T: TimeServerPort + 'static,
{
    lifecycle: Lifecycle,
    ctx: Arc<AppContext>,
    inbox: RegistrationQueue,
    ports: Option<(C, T)>,
}

impl<C, T> RegistrationTask<C, T>
where
    C: ConnectivityPort + 'static,
    T: TimeServerPort + 'static,
{
    pub const NAME: &'static str = "Registration";

    pub fn new(ctx: Arc<AppContext>, connectivity: C, time_server: T) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            ctx,
            inbox: RegistrationQueue::new(),
            ports: Some((connectivity, time_server)),
        }
    }
}

impl<C, T> AppTask for RegistrationTask<C, T>
where
    C: ConnectivityPort + 'static,
    T: TimeServerPort + 'static,
{
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn start(&mut self) -> Result<()> {
        if self.lifecycle.state() != TaskState::NotStarted {
            return Err(Error::ConfigurationInvalid("task already started"));
        }
        let (mut connectivity, time_server) = self
            .ports
            .take()
            .ok_or(Error::ResourceExhausted("connectivity port"))?;

        let ctx = Arc::clone(&self.ctx);
        let inbox = self.inbox.clone();
        connectivity.set_status_callback(Box::new(move |is_up| {
            on_link_status(&ctx, is_up);
            if let Err(e) = inbox.send(RegistrationMsg::LinkChanged { up: is_up }) {
                debug!("Link change not queued: {}", e);
            }
        }));

        let worker = RegistrationWorker {
            ctx: Arc::clone(&self.ctx),
            inbox: self.inbox.clone(),
            token: StopToken::new(self.ctx.shutdown.clone(), self.lifecycle.clone()),
            lifecycle: self.lifecycle.clone(),
            connectivity,
            time_server,
            phase: RegistrationPhase::Down,
            clock_synced: false,
        };
        self.inbox.open();
        if let Err(e) = self.lifecycle.spawn(SMALL_STACK, move || worker.run()) {
            self.inbox.close();
            return Err(e);
        }
        Ok(())
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

struct RegistrationWorker<C: ConnectivityPort, T: TimeServerPort> {
    ctx: Arc<AppContext>,
    inbox: RegistrationQueue,
    token: StopToken,
    lifecycle: Lifecycle,
    connectivity: C,
    time_server: T,
    phase: RegistrationPhase,
    /// Time sync is attempted once, after the first bring-up.
    clock_synced: bool,
}

impl<C: ConnectivityPort, T: TimeServerPort> RegistrationWorker<C, T> {
    fn run(mut self) {
        let dwell_total = Duration::from_secs(u64::from(self.ctx.config.network_dwell_secs));
        let slice = self.ctx.dwell_slice();

        // Once the application flag is set there is nothing left to manage;
        // wait for our own stop request so teardown happens in tier order.
        while !self.lifecycle.exit_requested() {
            if self.token.keep_going() {
                self.supervise();
            }
            let inbox = self.inbox.clone();
            std::thread::sleep(slice);
            dwell(dwell_total, slice, || {
                let mut link_changed = false;
                inbox.drain(|RegistrationMsg::LinkChanged { .. }| link_changed = true);
                !self.lifecycle.exit_requested() && !link_changed
            });
        }

        self.deregister();
        self.inbox.close();
        info!("Network Registration Task finished.");
    }

    fn supervise(&mut self) {
        if !self.ctx.network.is_up() {
            if self.phase == RegistrationPhase::Up {
                self.phase = RegistrationPhase::RegistrationUnknown;
            }
            self.register();
        }

        if self.ctx.network.is_up() {
            self.phase = RegistrationPhase::Up;
            info!("Network is up and running");
        } else {
            self.ctx.status.set(ApplicationStatus::RegistrationUnknown);
            info!("Unknown network registration state ({:?})", self.phase);
        }
    }

    fn register(&mut self) {
        self.phase = RegistrationPhase::Registering;
        self.ctx.status.set(ApplicationStatus::Registering);
        info!("Bringing up the cellular network...");

        let config = BringUpConfig {
            apn: self.ctx.config.apn.clone(),
            timeout: Duration::from_secs(u64::from(self.ctx.config.bring_up_timeout_secs)),
        };
        let token = self.token.clone();
        let keep_going = move || {
            let kg = token.keep_going();
            if !kg {
                info!("Network registration cancelled");
            }
            kg
        };
        match self.connectivity.bring_up(&config, &keep_going) {
            Ok(()) => {
                self.ctx.network.record_transition(true);
                self.ctx.status.set(ApplicationStatus::Registered);
                info!("Connected to Cellular Network");
                if !self.clock_synced {
                    self.clock_synced = true;
                    if sync_wall_clock(&self.ctx, &mut self.connectivity, &mut self.time_server).is_none() {
                        warn!("Wall clock unavailable, logging uptime instead");
                    }
                }
            }
            Err(e) => {
                self.phase = RegistrationPhase::Down;
                warn!("Failed to bring up the cellular network: {}", e);
            }
        }
    }

    fn deregister(&mut self) {
        self.ctx.status.set(ApplicationStatus::Registering);
        info!("Deregistering from the network...");
        match self.connectivity.tear_down() {
            Ok(()) => info!("Deregistered from cellular network"),
            Err(e) => warn!("Failed to de-register from the cellular network: {}", e),
        }
        self.ctx.network.record_transition(false);
        self.phase = RegistrationPhase::Down;
    }
}
