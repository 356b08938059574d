//! Signal-quality report task.
//!
//! Once per dwell interval: refresh the radio parameters and, if the
//! serving cell was measured and the network is up, publish them to
//! `/<serial>/SignalQuality` as `{"rsrp":..,"rsrq":..}`.  A
//! [`SignalMsg::MeasureNow`] cuts the current dwell short.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use super::session::SessionHandle;
use super::{SMALL_STACK, device_topic};
use crate::app::ports::{QoS, RadioPort, SignalQuality};
use crate::error::{Error, Result};
use crate::events::EventQueue;
use crate::runtime::{AppContext, AppTask, Lifecycle, StopToken, TaskState, dwell};
use crate::status::ApplicationStatus;

pub const SIGNAL_INBOX: usize = 4;
pub const SIGNAL_TOPIC: &str = "SignalQuality";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMsg {
    MeasureNow,
}

pub type SignalQueue = EventQueue<SignalMsg, SIGNAL_INBOX>;

/// What one measurement cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Published(SignalQuality),
    /// RSRP was zero: no serving cell measured.
    NotMeasured,
    NetworkDown,
    Failed(Error),
}

/// Run one measurement cycle.  The status shows `SignalReportStart` for
/// the duration and is restored afterwards.
pub fn measure<R: RadioPort + ?Sized>(ctx: &AppContext, radio: &mut R, session: &SessionHandle, topic: &str) -> Report {
    ctx.status.push_transient(ApplicationStatus::SignalReportStart);
    let report = match radio.refresh() {
        Ok(quality) if quality.rsrp == 0 => Report::NotMeasured,
        Ok(_) if !ctx.network.is_up() => Report::NetworkDown,
        Ok(quality) => {
            ctx.status.set(ApplicationStatus::SignalReport);
            info!("RSRP: {} dBm, RSRQ: {} dB", quality.rsrp, quality.rsrq);
            match serde_json::to_vec(&quality) {
                Ok(payload) => match session.publish(topic, payload, QoS::AtMostOnce, false) {
                    Ok(()) => Report::Published(quality),
                    Err(e) => Report::Failed(e),
                },
                Err(_) => Report::Failed(Error::ConfigurationInvalid("signal report encoding")),
            }
        }
        Err(e) => Report::Failed(e),
    };
    ctx.status.pop();

    match report {
        Report::NotMeasured => info!("No signal measured, nothing to report"),
        Report::NetworkDown => info!("Network is down, signal report skipped"),
        Report::Failed(e) => warn!("Signal report failed: {}", e),
        Report::Published(_) => {}
    }
    report
}

pub struct SignalTask<R: RadioPort + 'static> {
    lifecycle: Lifecycle,
    ctx: Arc<AppContext>,
    inbox: SignalQueue,
    session: SessionHandle,
    topic: String,
    radio: Option<R>,
}

impl<R: RadioPort + 'static> SignalTask<R> {
    pub const NAME: &'static str = "SignalReport";

    pub fn new(ctx: Arc<AppContext>, radio: R, session: SessionHandle, serial: &str) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            ctx,
            inbox: SignalQueue::new(),
            session,
            topic: device_topic(serial, SIGNAL_TOPIC),
            radio: Some(radio),
        }
    }

    pub fn inbox(&self) -> SignalQueue {
        self.inbox.clone()
    }
}

impl<R: RadioPort + 'static> AppTask for SignalTask<R> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn start(&mut self) -> Result<()> {
        if self.lifecycle.state() != TaskState::NotStarted {
            return Err(Error::ConfigurationInvalid("task already started"));
        }
        let radio = self.radio.take().ok_or(Error::ResourceExhausted("radio port"))?;
        let worker = SignalWorker {
            ctx: Arc::clone(&self.ctx),
            inbox: self.inbox.clone(),
            token: StopToken::new(self.ctx.shutdown.clone(), self.lifecycle.clone()),
            session: self.session.clone(),
            topic: self.topic.clone(),
            radio,
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

struct SignalWorker<R: RadioPort> {
    ctx: Arc<AppContext>,
    inbox: SignalQueue,
    token: StopToken,
    session: SessionHandle,
    topic: String,
    radio: R,
}

impl<R: RadioPort> SignalWorker<R> {
    fn run(mut self) {
        let dwell_total = Duration::from_secs(u64::from(self.ctx.config.signal_report_dwell_secs));
        let slice = self.ctx.dwell_slice();

        while self.token.keep_going() {
            measure(&self.ctx, &mut self.radio, &self.session, &self.topic);

            dwell(dwell_total, slice, || {
                let now = self.inbox.drain(|SignalMsg::MeasureNow| {}) > 0;
                self.token.keep_going() && !now
            });
        }

        self.inbox.close();
        info!("Signal Report Task finished.");
    }
}
