//! Network registration state shared by every task.
//!
//! Written by the registration supervisor and by the connectivity layer's
//! status callback; read by every task that gates work on the network
//! being up.  All fields are independent atomics.  Readers may see a
//! slightly stale combination, which is acceptable for gating decisions.

use core::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

/// Offset value meaning "wall clock never obtained".
const OFFSET_UNSET: i64 = 0;

/// Registration phases the supervisor moves through.
///
/// ```text
/// Down ──▶ Registering ──▶ Up ──(link lost)──▶ RegistrationUnknown ──▶ Registering
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPhase {
    Down,
    Registering,
    Up,
    RegistrationUnknown,
}

#[derive(Debug, Default)]
pub struct NetworkState {
    up: AtomicBool,
    up_transitions: AtomicU32,
    /// Unix seconds minus uptime seconds at the moment of sync.
    wall_clock_offset: AtomicI64,
}

impl NetworkState {
    pub const fn new() -> Self {
        Self {
            up: AtomicBool::new(false),
            up_transitions: AtomicU32::new(0),
            wall_clock_offset: AtomicI64::new(OFFSET_UNSET),
        }
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    /// Record a connectivity report.  Only a down→up edge is counted, so
    /// repeated "up" reports leave the counter alone.  Returns `true` when
    /// this call was such an edge.
    pub fn record_transition(&self, is_up: bool) -> bool {
        let was_up = self.up.swap(is_up, Ordering::AcqRel);
        if is_up && !was_up {
            self.up_transitions.fetch_add(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    /// Number of down→up edges seen since boot.
    pub fn up_transitions(&self) -> u32 {
        self.up_transitions.load(Ordering::Acquire)
    }

    /// Store the wall clock as an offset from uptime.
    pub fn set_wall_clock(&self, unix_secs: i64, uptime_ms: u64) {
        let offset = unix_secs - (uptime_ms / 1000) as i64;
        // An offset of exactly zero would read back as unset.
        let offset = if offset == OFFSET_UNSET { 1 } else { offset };
        self.wall_clock_offset.store(offset, Ordering::Release);
    }

    pub fn wall_clock_offset(&self) -> Option<i64> {
        match self.wall_clock_offset.load(Ordering::Acquire) {
            OFFSET_UNSET => None,
            offset => Some(offset),
        }
    }

    /// Current unix time derived from uptime, if the wall clock was ever synced.
    pub fn unix_time(&self, uptime_ms: u64) -> Option<i64> {
        self.wall_clock_offset()
            .map(|offset| offset + (uptime_ms / 1000) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_up_counts_once() {
        let net = NetworkState::new();
        assert!(net.record_transition(true));
        assert!(!net.record_transition(true));
        assert_eq!(net.up_transitions(), 1);
        assert!(net.is_up());
    }

    #[test]
    fn down_then_up_counts_again() {
        let net = NetworkState::new();
        net.record_transition(true);
        net.record_transition(false);
        assert!(!net.is_up());
        net.record_transition(true);
        assert_eq!(net.up_transitions(), 2);
    }

    #[test]
    fn wall_clock_unset_until_synced() {
        let net = NetworkState::new();
        assert_eq!(net.unix_time(5_000), None);
        net.set_wall_clock(1_700_000_000, 10_000);
        assert_eq!(net.wall_clock_offset(), Some(1_699_999_990));
        assert_eq!(net.unix_time(20_000), Some(1_700_000_010));
    }
}
