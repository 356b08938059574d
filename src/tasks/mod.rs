//! Application tasks.
//!
//! | Task           | Module          | Stop tier   | Inbox consumption       |
//! |----------------|-----------------|-------------|-------------------------|
//! | `Indicator`    | `indicator`     | Indicator   | drained every tick      |
//! | `Registration` | `registration`  | Network     | drained while dwelling  |
//! | `Session`      | `session`       | Consumer    | drained while dwelling  |
//! | `SignalReport` | `signal`        | Consumer    | drained while dwelling  |
//! | `Scan`         | `scan`          | Consumer    | dedicated dispatcher    |
//!
//! Start order in `main`: indicator, registration, session, then the
//! tasks that publish through the session.

pub mod indicator;
pub mod registration;
pub mod scan;
pub mod session;
pub mod signal;
pub mod topics;

/// Worker stack sizes (bytes).
pub(crate) const SMALL_STACK: usize = 32 * 1024;
pub(crate) const LARGE_STACK: usize = 64 * 1024;

/// Topic owned by this device: `/<serial>/<leaf>`.
pub fn device_topic(serial: &str, leaf: &str) -> String {
    format!("/{}/{}", serial, leaf)
}
