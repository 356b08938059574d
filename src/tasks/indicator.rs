//! Status indicator task.
//!
//! Every tick it samples the application status, runs the pattern engine
//! and writes changed channels to the [`IndicatorPort`].  The pattern
//! table is owned here; other tasks change the manual row through the
//! inbox, which is drained at the top of every tick.
//!
//! The task ignores the application shutdown flag and stops only when
//! asked directly, so it can show `ShuttingDown` while the rest of the
//! system winds down.  All channels are switched off on exit.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use super::SMALL_STACK;
use crate::app::ports::IndicatorPort;
use crate::drivers::led_patterns::{CHANNELS, ChannelPattern, PatternEngine, PatternRow};
use crate::error::{Error, Result};
use crate::events::EventQueue;
use crate::runtime::{AppContext, AppTask, Lifecycle, StopToken, TaskState};
use crate::status::ApplicationStatus;

pub const INDICATOR_INBOX: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorMsg {
    /// Replace one channel of the manual row and show it.
    SetManualChannel { channel: usize, pattern: ChannelPattern },
    /// Replace the whole manual row and show it.
    SetManual(PatternRow),
    /// Copy the row of the current status into the manual row and show it.
    CopyToManual,
    /// Copy the current row, replace one channel, and show it.
    AddToManual { channel: usize, pattern: ChannelPattern },
}

pub type IndicatorQueue = EventQueue<IndicatorMsg, INDICATOR_INBOX>;

/// Cloneable front for diagnostics code that wants to drive the LEDs by hand.
#[derive(Clone)]
pub struct IndicatorHandle {
    inbox: IndicatorQueue,
}

impl IndicatorHandle {
    pub fn set_manual_channel(&self, channel: usize, pattern: ChannelPattern) -> Result<()> {
        self.inbox.send(IndicatorMsg::SetManualChannel { channel, pattern })
    }

    pub fn set_manual(&self, red: ChannelPattern, green: ChannelPattern, blue: ChannelPattern) -> Result<()> {
        self.inbox.send(IndicatorMsg::SetManual([red, green, blue]))
    }

    pub fn copy_to_manual(&self) -> Result<()> {
        self.inbox.send(IndicatorMsg::CopyToManual)
    }

    pub fn add_to_manual(&self, channel: usize, pattern: ChannelPattern) -> Result<()> {
        self.inbox.send(IndicatorMsg::AddToManual { channel, pattern })
    }
}

pub struct IndicatorTask<I: IndicatorPort + 'static> {
    lifecycle: Lifecycle,
    ctx: Arc<AppContext>,
    inbox: IndicatorQueue,
    port: Option<I>,
}

impl<I: IndicatorPort + 'static> IndicatorTask<I> {
    pub const NAME: &'static str = "Indicator";

    pub fn new(ctx: Arc<AppContext>, port: I) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            ctx,
            inbox: IndicatorQueue::new(),
            port: Some(port),
        }
    }

    pub fn handle(&self) -> IndicatorHandle {
        IndicatorHandle {
            inbox: self.inbox.clone(),
        }
    }
}

impl<I: IndicatorPort + 'static> AppTask for IndicatorTask<I> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn start(&mut self) -> Result<()> {
        if self.lifecycle.state() != TaskState::NotStarted {
            return Err(Error::ConfigurationInvalid("task already started"));
        }
        let port = self.port.take().ok_or(Error::ResourceExhausted("indicator port"))?;
        let worker = IndicatorWorker {
            ctx: Arc::clone(&self.ctx),
            inbox: self.inbox.clone(),
            token: StopToken::task_only(self.lifecycle.clone()),
            engine: PatternEngine::new(),
            port,
            shown: None,
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

struct IndicatorWorker<I: IndicatorPort> {
    ctx: Arc<AppContext>,
    inbox: IndicatorQueue,
    token: StopToken,
    engine: PatternEngine,
    port: I,
    shown: Option<[bool; CHANNELS]>,
}

impl<I: IndicatorPort> IndicatorWorker<I> {
    fn run(mut self) {
        let tick_ms = self.ctx.config.indicator_tick_ms;
        let tick = Duration::from_millis(u64::from(tick_ms));

        while self.token.keep_going() {
            let inbox = self.inbox.clone();
            inbox.drain(|msg| self.apply(msg));

            let output = self.engine.tick(self.ctx.status.get(), tick_ms);
            self.show(output);
            std::thread::sleep(tick);
        }

        for channel in 0..CHANNELS {
            self.port.set_channel(channel, false);
        }
        self.inbox.close();
        info!("Indicator task finished.");
    }

    fn apply(&mut self, msg: IndicatorMsg) {
        match msg {
            IndicatorMsg::SetManualChannel { channel, pattern } => {
                self.engine.set_manual_channel(channel, pattern);
                self.ctx.status.set(ApplicationStatus::Manual);
            }
            IndicatorMsg::SetManual(row) => {
                self.engine.set_manual(row);
                self.ctx.status.set(ApplicationStatus::Manual);
            }
            IndicatorMsg::CopyToManual => {
                self.engine.copy_to_manual(self.ctx.status.get());
                self.ctx.status.set(ApplicationStatus::Manual);
            }
            IndicatorMsg::AddToManual { channel, pattern } => {
                self.engine.add_to_manual(self.ctx.status.get(), channel, pattern);
                self.ctx.status.set(ApplicationStatus::Manual);
            }
        }
    }

    /// Write only the channels that changed since the last tick.
    fn show(&mut self, output: [bool; CHANNELS]) {
        for (channel, &on) in output.iter().enumerate() {
            if self.shown.is_none_or(|shown| shown[channel] != on) {
                self.port.set_channel(channel, on);
            }
        }
        self.shown = Some(output);
    }
}
