//! Network scan (diagnostics) task.
//!
//! The worker thread sits in [`EventQueue::dispatch`] and reacts to
//! [`ScanMsg`].  A scan itself runs on a second thread so the dispatcher
//! stays responsive:
//!
//! ```text
//!   idle ──Start──▶ running ──scan returns──▶ idle
//!                      │
//!                      └──Start or Cancel──▶ cancel flag set ──▶ idle
//! ```
//!
//! Only one scan runs at a time; a `Start` while running is a cancel.
//! Each network found is published to `/<serial>/NetworkScan`, followed
//! by one summary message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use log::{info, warn};
use serde::Serialize;

use super::session::SessionHandle;
use super::{LARGE_STACK, SMALL_STACK, device_topic};
use crate::app::ports::{QoS, ScanPort, ScanResult};
use crate::error::{Error, Result};
use crate::events::EventQueue;
use crate::runtime::{AppContext, AppTask, Lifecycle, StopToken, TaskState};
use crate::status::ApplicationStatus;

pub const SCAN_INBOX: usize = 4;
pub const SCAN_TOPIC: &str = "NetworkScan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMsg {
    /// Start a scan, or cancel the one in progress.
    Start,
    Cancel,
}

pub type ScanQueue = EventQueue<ScanMsg, SCAN_INBOX>;

/// Final message of a scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ScanSummary {
    Completed { found: usize },
    NoneFound,
    Error { reason: String },
    Cancelled,
}

impl ScanSummary {
    fn from_outcome(outcome: Result<usize>, cancelled: bool) -> Self {
        match outcome {
            _ if cancelled => Self::Cancelled,
            Ok(0) => Self::NoneFound,
            Ok(found) => Self::Completed { found },
            Err(e) => Self::Error { reason: e.to_string() },
        }
    }
}

#[derive(Clone)]
pub struct ScanHandle {
    inbox: ScanQueue,
}

impl ScanHandle {
    /// Start a scan; cancels instead if one is already running.
    pub fn toggle(&self) -> Result<()> {
        self.inbox.send(ScanMsg::Start)
    }

    pub fn cancel(&self) -> Result<()> {
        self.inbox.send(ScanMsg::Cancel)
    }
}

/// State shared between the dispatcher and the scan thread.
struct ScanRun {
    active: AtomicBool,
    cancel: AtomicBool,
}

pub struct ScanTask<S: ScanPort + 'static> {
    lifecycle: Lifecycle,
    ctx: Arc<AppContext>,
    inbox: ScanQueue,
    session: SessionHandle,
    topic: String,
    run: Arc<ScanRun>,
    scanner: Option<S>,
}

impl<S: ScanPort + 'static> ScanTask<S> {
    pub const NAME: &'static str = "Scan";

    pub fn new(ctx: Arc<AppContext>, scanner: S, session: SessionHandle, serial: &str) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            ctx,
            inbox: ScanQueue::new(),
            session,
            topic: device_topic(serial, SCAN_TOPIC),
            run: Arc::new(ScanRun {
                active: AtomicBool::new(false),
                cancel: AtomicBool::new(false),
            }),
            scanner: Some(scanner),
        }
    }

    pub fn inbox(&self) -> ScanQueue {
        self.inbox.clone()
    }

    pub fn handle(&self) -> ScanHandle {
        ScanHandle { inbox: self.inbox() }
    }

    pub fn is_scanning(&self) -> bool {
        self.run.active.load(Ordering::Acquire)
    }
}

impl<S: ScanPort + 'static> AppTask for ScanTask<S> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn start(&mut self) -> Result<()> {
        if self.lifecycle.state() != TaskState::NotStarted {
            return Err(Error::ConfigurationInvalid("task already started"));
        }
        let scanner = self.scanner.take().ok_or(Error::ResourceExhausted("scan port"))?;
        let mut worker = ScanWorker {
            ctx: Arc::clone(&self.ctx),
            inbox: self.inbox.clone(),
            token: StopToken::new(self.ctx.shutdown.clone(), self.lifecycle.clone()),
            session: self.session.clone(),
            topic: self.topic.clone(),
            run: Arc::clone(&self.run),
            scanner: Arc::new(Mutex::new(scanner)),
            runner: None,
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

    /// Also cancels a running scan and wakes the dispatcher.
    fn request_stop(&self) {
        self.lifecycle.request_stop();
        self.run.cancel.store(true, Ordering::Release);
        self.inbox.close();
    }
}

struct ScanWorker<S: ScanPort> {
    ctx: Arc<AppContext>,
    inbox: ScanQueue,
    token: StopToken,
    session: SessionHandle,
    topic: String,
    run: Arc<ScanRun>,
    scanner: Arc<Mutex<S>>,
    runner: Option<JoinHandle<()>>,
}

impl<S: ScanPort + 'static> ScanWorker<S> {
    fn run(&mut self) {
        let inbox = self.inbox.clone();
        inbox.dispatch(|msg| self.handle(msg));

        self.run.cancel.store(true, Ordering::Release);
        if let Some(runner) = self.runner.take() {
            info!("Waiting for the network scan to finish...");
            if runner.join().is_err() {
                warn!("Network scan thread panicked");
            }
        }
        info!("Network Scan Task finished.");
    }

    fn handle(&mut self, msg: ScanMsg) {
        let active = self.run.active.load(Ordering::Acquire);
        match msg {
            ScanMsg::Start | ScanMsg::Cancel if active => {
                info!("Cancelling the network scan");
                self.run.cancel.store(true, Ordering::Release);
            }
            ScanMsg::Start => self.start_scan(),
            ScanMsg::Cancel => info!("No network scan to cancel"),
        }
    }

    fn start_scan(&mut self) {
        if let Some(previous) = self.runner.take() {
            let _ = previous.join();
        }
        self.run.cancel.store(false, Ordering::Release);
        self.run.active.store(true, Ordering::Release);

        let ctx = Arc::clone(&self.ctx);
        let token = self.token.clone();
        let session = self.session.clone();
        let topic = self.topic.clone();
        let run = Arc::clone(&self.run);
        let scanner = Arc::clone(&self.scanner);
        let spawned = std::thread::Builder::new()
            .name("scan-run".into())
            .stack_size(LARGE_STACK)
            .spawn(move || {
                let mut scanner = lock(&*scanner);
                let summary = scan(&ctx, &mut *scanner, &token, &run.cancel, &session, &topic);
                info!("Network scan finished: {:?}", summary);
                run.active.store(false, Ordering::Release);
            });
        match spawned {
            Ok(handle) => self.runner = Some(handle),
            Err(e) => {
                self.run.active.store(false, Ordering::Release);
                warn!("Failed to start the network scan: {}", e);
            }
        }
    }
}

fn lock<S>(scanner: &Mutex<S>) -> MutexGuard<'_, S> {
    scanner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Run one scan to completion or cancellation, publishing as it goes.
pub fn scan<S: ScanPort + ?Sized>(
    ctx: &AppContext,
    scanner: &mut S,
    token: &StopToken,
    cancel: &AtomicBool,
    session: &SessionHandle,
    topic: &str,
) -> ScanSummary {
    ctx.status.push_transient(ApplicationStatus::Scanning);
    info!("Starting network scan...");

    let keep_going = || token.keep_going() && !cancel.load(Ordering::Acquire);
    let mut on_result = |result: &ScanResult| {
        info!("Found network {} ({})", result.operator, result.mcc_mnc);
        publish(session, topic, result);
    };
    let outcome = scanner.scan(&keep_going, &mut on_result);
    let summary = ScanSummary::from_outcome(outcome, !keep_going());

    publish(session, topic, &summary);
    ctx.status.pop();
    summary
}

fn publish<T: Serialize>(session: &SessionHandle, topic: &str, value: &T) {
    let sent = serde_json::to_vec(value)
        .map_err(|_| Error::ConfigurationInvalid("scan report encoding"))
        .and_then(|payload| session.publish(topic, payload, QoS::AtMostOnce, false));
    if let Err(e) = sent {
        warn!("Scan report on {} dropped: {}", topic, e);
    }
}
