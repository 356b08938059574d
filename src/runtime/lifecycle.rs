//! Task lifecycle state.
//!
//! ```text
//!  NotStarted ──start──▶ Running ──request_stop──▶ Stopping ──worker returns──▶ Stopped
//!      ▲                    │                                                     ▲
//!      └── spawn failed ────┘            worker returns on its own ───────────────┘
//! ```
//!
//! `Running` is set before the worker thread is spawned and `Stopped` is
//! set by a guard owned by that thread, so [`Lifecycle::is_running`]
//! never reads false while the worker is alive and never reads true again
//! once `Stopped` has been observed.  `Stopped` is terminal.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::{error, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    NotStarted = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl TaskState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::NotStarted,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

struct Inner {
    name: &'static str,
    state: AtomicU8,
    exit: AtomicBool,
    stopped_lock: Mutex<()>,
    stopped: Condvar,
}

/// Shared handle to one task's lifecycle.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                state: AtomicU8::new(TaskState::NotStarted as u8),
                exit: AtomicBool::new(false),
                stopped_lock: Mutex::new(()),
                stopped: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// True from `start` until the worker has returned.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), TaskState::Running | TaskState::Stopping)
    }

    /// The task's private exit flag.
    pub fn exit_requested(&self) -> bool {
        self.inner.exit.load(Ordering::Acquire)
    }

    /// Set the exit flag.  The worker notices on its next dwell tick.
    pub fn request_stop(&self) {
        self.inner.exit.store(true, Ordering::Release);
        let _ = self.inner.state.compare_exchange(
            TaskState::Running as u8,
            TaskState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        info!("Stop {} task requested...", self.inner.name);
    }

    /// Move to `Running` and run `body` on a new named thread.
    ///
    /// Fails without side effects if the task is not `NotStarted` or the
    /// thread cannot be created.
    pub fn spawn<F>(&self, stack_size: usize, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self
            .inner
            .state
            .compare_exchange(
                TaskState::NotStarted as u8,
                TaskState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(Error::ConfigurationInvalid("task already started"));
        }
        self.inner.exit.store(false, Ordering::Release);

        let guard = RunGuard {
            lifecycle: self.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name(self.inner.name.into())
            .stack_size(stack_size)
            .spawn(move || {
                let _guard = guard;
                body();
            });

        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                // The closure (and its guard) was dropped; undo its Stopped mark.
                self.inner.state.store(TaskState::NotStarted as u8, Ordering::Release);
                error!("Failed to create the {} task ({})", self.inner.name, e);
                Err(Error::ResourceExhausted("worker thread"))
            }
        }
    }

    /// Block until the worker has returned or `timeout` elapsed.
    /// Returns `true` if the task is stopped (or was never started).
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let Ok(guard) = self.inner.stopped_lock.lock() else {
            return !self.is_running();
        };
        match self
            .inner
            .stopped
            .wait_timeout_while(guard, timeout, |_| self.is_running())
        {
            Ok((_, result)) => !result.timed_out() || !self.is_running(),
            Err(_) => !self.is_running(),
        }
    }
}

/// Owned by the worker thread; marks the task `Stopped` when it exits.
struct RunGuard {
    lifecycle: Lifecycle,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let inner = &self.lifecycle.inner;
        let _lock = inner.stopped_lock.lock();
        inner.state.store(TaskState::Stopped as u8, Ordering::Release);
        inner.stopped.notify_all();
    }
}
