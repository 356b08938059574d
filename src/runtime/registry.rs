//! Task registry: starts every task exactly once and stops them in
//! dependency order.
//!
//! Start order is registration order.  Stop order is by [`StopTier`]:
//!
//! | Tier        | Members                          | Why last/first          |
//! |-------------|----------------------------------|-------------------------|
//! | `Consumer`  | session, signal report, scan     | use the network         |
//! | `Network`   | registration supervisor          | deregisters on exit     |
//! | `Indicator` | status indicator                 | shows the final status  |
//!
//! Each tier is asked to stop, then polled until every member reports not
//! running.  Each poll logs the tasks still being waited on.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use super::{AppContext, AppTask};
use crate::error::{Error, Result};
use crate::status::ApplicationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopTier {
    Consumer,
    Network,
    Indicator,
}

impl StopTier {
    pub const ORDER: [Self; 3] = [Self::Consumer, Self::Network, Self::Indicator];
}

struct Entry {
    task: Box<dyn AppTask>,
    tier: StopTier,
}

pub struct TaskRegistry {
    ctx: Arc<AppContext>,
    entries: Vec<Entry>,
}

impl TaskRegistry {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, task: impl AppTask + 'static, tier: StopTier) {
        self.entries.push(Entry {
            task: Box::new(task),
            tier,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.task.name())
    }

    /// Running state of the task called `name`, `None` if unknown.
    pub fn is_running(&self, name: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.task.name() == name)
            .map(|e| e.task.is_running())
    }

    pub fn any_running(&self) -> bool {
        self.entries.iter().any(|e| e.task.is_running())
    }

    /// Start every task not already running, in registration order.
    ///
    /// The first failure sets the application status to `Error` and is
    /// returned; the remaining tasks are left unstarted.
    pub fn start_all(&mut self) -> Result<()> {
        for entry in &mut self.entries {
            let name = entry.task.name();
            if entry.task.is_running() {
                info!("{} task already running", name);
                continue;
            }
            info!("Starting the {} task...", name);
            if let Err(e) = entry.task.start() {
                error!("Failed to start the {} task: {}", name, e);
                self.ctx.status.set(ApplicationStatus::Error);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Start-up was aborted by `cause` before the full task set was built.
    ///
    /// Sets status `Error`, starts whatever is registered (normally only the
    /// indicator, so the error pattern is shown) and returns `cause`.
    pub fn start_degraded(&mut self, cause: Error) -> Result<()> {
        error!("Start-up aborted: {}", cause);
        self.ctx.status.set(ApplicationStatus::Error);
        self.start_all().and(Err(cause))
    }

    /// Run until the application shutdown flag is set, then stop every tier.
    ///
    /// A failed start skips the wait.  Its `Error` status is kept through
    /// the stop sequence; only a clean run shows `ShuttingDown`.
    pub fn run_until_shutdown(&self, started: Result<()>) -> Result<()> {
        match started {
            Ok(()) => {
                info!("System ready: {} tasks running", self.len());
                while !self.ctx.shutdown.is_requested() {
                    std::thread::sleep(self.ctx.dwell_slice());
                }
                info!("Shutdown requested");
                self.ctx.status.set(ApplicationStatus::ShuttingDown);
            }
            Err(e) => {
                error!("Start-up failed: {}, shutting down", e);
                self.ctx.status.set(ApplicationStatus::Error);
            }
        }
        self.ctx.shutdown.request();
        self.stop_all()
    }

    /// Stop all tasks tier by tier.
    ///
    /// A tier that does not stop within the configured number of polls is
    /// reported as [`Error::Timeout`]; later tiers are still stopped.
    pub fn stop_all(&self) -> Result<()> {
        let mut outcome = Ok(());
        for tier in StopTier::ORDER {
            for entry in self.entries.iter().filter(|e| e.tier == tier) {
                entry.task.request_stop();
            }
            if let Err(e) = self.wait_for_tier(tier) {
                outcome = Err(e);
            }
        }
        outcome
    }

    fn wait_for_tier(&self, tier: StopTier) -> Result<()> {
        let poll = Duration::from_millis(u64::from(self.ctx.config.shutdown_poll_ms));
        for _ in 0..self.ctx.config.max_shutdown_polls {
            let mut waiting = self
                .entries
                .iter()
                .filter(|e| e.tier == tier && e.task.is_running())
                .peekable();
            let Some(first) = waiting.peek().map(|e| e.task.lifecycle().clone()) else {
                return Ok(());
            };
            for entry in waiting {
                info!("Waiting for {} task to stop...", entry.task.name());
            }
            first.wait_until_stopped(poll);
        }

        let stuck: Vec<&'static str> = self
            .entries
            .iter()
            .filter(|e| e.tier == tier && e.task.is_running())
            .map(|e| e.task.name())
            .collect();
        if stuck.is_empty() {
            Ok(())
        } else {
            error!("{:?} tier did not stop: {}", tier, stuck.join(", "));
            Err(Error::Timeout)
        }
    }
}
