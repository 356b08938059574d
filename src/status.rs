//! Application status cell.
//!
//! One process-wide [`ApplicationStatus`] is active at a time.  Writers
//! overwrite it unconditionally (last writer wins); the indicator task
//! samples it every tick.  There is no change notification.
//!
//! A task that wants to show a temporary status uses
//! [`StatusCell::push_transient`] / [`StatusCell::pop`].  The saved slot is
//! one deep: a second push before the pop overwrites the first saved value.
//!
//! Races between writers are tolerated.  The value is advisory and only
//! drives the status indicator.

use core::sync::atomic::{AtomicU8, Ordering};

/// Every status the application can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ApplicationStatus {
    /// Indicator pattern set by hand (diagnostics).
    Manual = 0,
    Initializing = 1,
    Registering = 2,
    SessionConnecting = 3,
    /// A network scan is in progress.
    Scanning = 4,
    /// Signal quality is being published.
    SignalReport = 5,
    RegistrationUnknown = 6,
    Registered = 7,
    Error = 8,
    ShuttingDown = 9,
    SessionConnected = 10,
    SessionDisconnected = 11,
    /// Radio parameters are being sampled.
    SignalReportStart = 12,
}

impl ApplicationStatus {
    /// Number of statuses (rows of the indicator pattern table).
    pub const COUNT: usize = 13;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Manual,
        Self::Initializing,
        Self::Registering,
        Self::SessionConnecting,
        Self::Scanning,
        Self::SignalReport,
        Self::RegistrationUnknown,
        Self::Registered,
        Self::Error,
        Self::ShuttingDown,
        Self::SessionConnected,
        Self::SessionDisconnected,
        Self::SignalReportStart,
    ];

    /// Row index into the indicator pattern table.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_u8(raw: u8) -> Option<Self> {
        if (raw as usize) < Self::COUNT {
            Some(Self::ALL[raw as usize])
        } else {
            None
        }
    }
}

/// Sentinel for "nothing saved".
const NO_SAVED: u8 = u8::MAX;

/// Shared status cell with a single saved slot.
#[derive(Debug)]
pub struct StatusCell {
    current: AtomicU8,
    saved: AtomicU8,
}

impl StatusCell {
    pub const fn new(initial: ApplicationStatus) -> Self {
        Self {
            current: AtomicU8::new(initial as u8),
            saved: AtomicU8::new(NO_SAVED),
        }
    }

    pub fn get(&self) -> ApplicationStatus {
        ApplicationStatus::from_u8(self.current.load(Ordering::Acquire))
            .unwrap_or(ApplicationStatus::Error)
    }

    /// Unconditional overwrite.
    pub fn set(&self, status: ApplicationStatus) {
        self.current.store(status as u8, Ordering::Release);
    }

    /// Save the current status, then set `status`.
    pub fn push_transient(&self, status: ApplicationStatus) {
        let previous = self.current.swap(status as u8, Ordering::AcqRel);
        self.saved.store(previous, Ordering::Release);
    }

    /// Restore the saved status.  Returns it, or `None` if nothing was saved.
    pub fn pop(&self) -> Option<ApplicationStatus> {
        let saved = self.saved.swap(NO_SAVED, Ordering::AcqRel);
        let status = ApplicationStatus::from_u8(saved)?;
        self.set(status);
        Some(status)
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(ApplicationStatus::Manual)
    }
}
