//! Cooperative task runtime.
//!
//! ```text
//!             ┌──────────────────────── AppContext (Arc) ─────────────────────────┐
//!             │  StatusCell    NetworkState    ShutdownFlag    Clock    AppConfig │
//!             └───────────────────────────────────────────────────────────────────┘
//!                   ▲               ▲               ▲
//!  ┌────────────────┴───┐  ┌────────┴─────────┐  ┌──┴──────────────┐
//!  │ TaskRegistry       │  │ AppTask (trait)  │  │ StopToken       │
//!  │ start_all/stop_all │─▶│ Lifecycle+inbox  │─▶│ keep_going()    │
//!  └────────────────────┘  └──────────────────┘  └─────────────────┘
//! ```
//!
//! Tasks share nothing but the cells in [`AppContext`] and each other's
//! inboxes.  Every worker loop sleeps only inside [`dwell`], so shutdown
//! latency is bounded by one dwell slice plus whatever collaborator call
//! is in flight.

pub mod lifecycle;
pub mod registry;

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapters::time::Clock;
use crate::config::AppConfig;
use crate::error::Result;
use crate::network::NetworkState;
use crate::status::{ApplicationStatus, StatusCell};

pub use lifecycle::{Lifecycle, TaskState};
pub use registry::{StopTier, TaskRegistry};

// ── Shutdown flag ─────────────────────────────────────────────

/// Application-wide "exit now" flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ── Shared context ────────────────────────────────────────────

/// State every task can see.
pub struct AppContext {
    pub config: AppConfig,
    pub status: StatusCell,
    pub network: NetworkState,
    pub shutdown: ShutdownFlag,
    pub clock: Clock,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            status: StatusCell::new(ApplicationStatus::Initializing),
            network: NetworkState::new(),
            shutdown: ShutdownFlag::new(),
            clock: Clock::new(),
        })
    }

    pub fn dwell_slice(&self) -> Duration {
        Duration::from_millis(u64::from(self.config.dwell_slice_ms))
    }
}

// ── Cancellation ──────────────────────────────────────────────

/// Keep-going predicate for one task: false once the application is
/// shutting down or the task was asked to stop.
#[derive(Clone)]
pub struct StopToken {
    shutdown: Option<ShutdownFlag>,
    lifecycle: Lifecycle,
}

impl StopToken {
    /// Observes both the application flag and the task's own exit flag.
    pub fn new(shutdown: ShutdownFlag, lifecycle: Lifecycle) -> Self {
        Self {
            shutdown: Some(shutdown),
            lifecycle,
        }
    }

    /// Observes only the task's own exit flag (tasks that must outlive
    /// the application flag, like the indicator).
    pub fn task_only(lifecycle: Lifecycle) -> Self {
        Self {
            shutdown: None,
            lifecycle,
        }
    }

    pub fn keep_going(&self) -> bool {
        let app_exit = self.shutdown.as_ref().is_some_and(ShutdownFlag::is_requested);
        !app_exit && !self.lifecycle.exit_requested()
    }
}

/// Sleep for up to `total` in steps of `slice`, calling `keep_dwelling`
/// before each step.  Returns `true` if the full period elapsed, `false`
/// if `keep_dwelling` cut it short.
pub fn dwell(total: Duration, slice: Duration, mut keep_dwelling: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if !keep_dwelling() {
            return false;
        }
        let elapsed = start.elapsed();
        if elapsed >= total {
            return true;
        }
        std::thread::sleep(slice.min(total - elapsed));
    }
}

// ── Task interface ────────────────────────────────────────────

/// One long-lived application task.
pub trait AppTask: Send {
    fn name(&self) -> &'static str;

    /// Open the inbox and spawn the worker.  All or nothing: on error the
    /// inbox is closed again and the task is not running.
    fn start(&mut self) -> Result<()>;

    fn lifecycle(&self) -> &Lifecycle;

    /// Ask the worker to finish.  Returns immediately.
    fn request_stop(&self) {
        self.lifecycle().request_stop();
    }

    fn is_running(&self) -> bool {
        self.lifecycle().is_running()
    }
}
