//! Unified error types for the CellNode runtime.
//!
//! A single `Error` enum that every task, queue and collaborator adapter
//! funnels into.  All variants are `Copy` so they can be logged, stored in
//! task state and compared in tests without allocation.
//!
//! Errors never cross a task boundary as control flow: each worker loop
//! turns them into a log line plus either a retry on the next dwell tick or
//! an `Error` status transition.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level runtime error
// ---------------------------------------------------------------------------

/// Every fallible operation in the runtime funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A bounded resource ran out (inbox full, topic table full, thread
    /// could not be created).  The operation is dropped, not fatal.
    ResourceExhausted(&'static str),
    /// The broker or the network is unavailable.  Skipped, retried on the
    /// next dwell tick.
    NotConnected,
    /// A bounded operation exceeded its deadline.  Retryable.
    Timeout,
    /// Configuration is unusable.  Fatal at start-up only.
    ConfigurationInvalid(&'static str),
    /// The target inbox is not open (task not started, or already stopped).
    QueueClosed,
    /// Any platform error not otherwise classified, with its raw code.
    Unknown(i32),
}

impl Error {
    /// Whether the failed operation may be attempted again on a later tick.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::NotConnected | Self::Timeout | Self::Unknown(_) => true,
            Self::ResourceExhausted(_) | Self::ConfigurationInvalid(_) | Self::QueueClosed => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted(what) => write!(f, "resource exhausted: {what}"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Timeout => write!(f, "timed out"),
            Self::ConfigurationInvalid(msg) => write!(f, "invalid configuration: {msg}"),
            Self::QueueClosed => write!(f, "inbox closed"),
            Self::Unknown(code) => write!(f, "platform error {code}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Runtime-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(Error::NotConnected.is_retryable());
        assert!(Error::Timeout.is_retryable());
        assert!(Error::Unknown(-1).is_retryable());
        assert!(!Error::ResourceExhausted("inbox full").is_retryable());
        assert!(!Error::ConfigurationInvalid("tick").is_retryable());
        assert!(!Error::QueueClosed.is_retryable());
    }

    #[test]
    fn display_keeps_raw_code() {
        assert_eq!(Error::Unknown(-42).to_string(), "platform error -42");
    }
}
