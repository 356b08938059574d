//! Indicator pattern table and tick engine.
//!
//! Each [`ApplicationStatus`] maps to one row of three channel patterns
//! (red, green, blue).  Every tick the engine advances the phase timer of
//! each channel in the active row and derives its on/off state:
//!
//! ```text
//!   on    = (timer < duty) != invert
//!   timer = timer + tick, back to 0 once it reaches period
//! ```
//!
//! If a channel marked `priority` is on, it alone is lit for that tick.
//! Timers belong to the (status, channel) cell, so returning to a status
//! resumes its blink where it left off.
//!
//! ## Presets (period / duty in ms)
//!
//! | Preset          | Period | Duty | Notes      |
//! |-----------------|--------|------|------------|
//! | `ON`            | 1000   | 1000 |            |
//! | `OFF`           | 1000   | 0    |            |
//! | `FLASH`         | 100    | 50   |            |
//! | `PULSE`         | 1000   | 750  |            |
//! | `BLINK`         | 1000   | 200  |            |
//! | `BLINK_INV`     | 1000   | 200  | inverted   |
//! | `FAST_PULSE`    | 500    | 100  |            |
//! | `FAST_PULSE_INV`| 500    | 100  | inverted   |
//! | `FAST_PRIORITY` | 500    | 200  | priority   |

use crate::status::ApplicationStatus;

/// Channels per row: red, green, blue.
pub const CHANNELS: usize = 3;

pub const RED: usize = 0;
pub const GREEN: usize = 1;
pub const BLUE: usize = 2;

/// Timing of one indicator channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPattern {
    pub period_ms: u32,
    /// Time on within each period; clamped to `period_ms`.
    pub duty_ms: u32,
    pub invert: bool,
    pub priority: bool,
}

impl ChannelPattern {
    pub const ON: Self = Self::new(1000, 1000);
    pub const OFF: Self = Self::new(1000, 0);
    pub const FLASH: Self = Self::new(100, 50);
    pub const PULSE: Self = Self::new(1000, 750);
    pub const BLINK: Self = Self::new(1000, 200);
    pub const BLINK_INV: Self = Self::new(1000, 200).inverted();
    pub const PULSE_INV: Self = Self::new(1000, 750).inverted();
    pub const FAST_PULSE: Self = Self::new(500, 100);
    pub const FAST_PULSE_INV: Self = Self::new(500, 100).inverted();
    pub const FAST_PRIORITY: Self = Self::new(500, 200).prioritised();

    pub const fn new(period_ms: u32, duty_ms: u32) -> Self {
        let period_ms = if period_ms == 0 { 1 } else { period_ms };
        let duty_ms = if duty_ms > period_ms { period_ms } else { duty_ms };
        Self {
            period_ms,
            duty_ms,
            invert: false,
            priority: false,
        }
    }

    pub const fn inverted(mut self) -> Self {
        self.invert = !self.invert;
        self
    }

    pub const fn prioritised(mut self) -> Self {
        self.priority = true;
        self
    }

    /// State of this channel when its phase timer reads `timer_ms`.
    pub const fn is_on_at(&self, timer_ms: u32) -> bool {
        (timer_ms < self.duty_ms) != self.invert
    }

    /// Phase timer after advancing by `tick_ms`.
    pub const fn advance(&self, timer_ms: u32, tick_ms: u32) -> u32 {
        let next = timer_ms.saturating_add(tick_ms);
        if next >= self.period_ms { 0 } else { next }
    }
}

pub type PatternRow = [ChannelPattern; CHANNELS];

/// Default status → pattern mapping.
pub const fn default_row(status: ApplicationStatus) -> PatternRow {
    use ChannelPattern as P;
    match status {
        ApplicationStatus::Manual => [P::OFF, P::OFF, P::OFF],
        ApplicationStatus::Initializing => [P::FAST_PULSE, P::OFF, P::OFF],
        ApplicationStatus::Registering => [P::OFF, P::OFF, P::BLINK],
        ApplicationStatus::SessionConnecting => [P::OFF, P::PULSE, P::OFF],
        ApplicationStatus::Scanning => [P::OFF, P::PULSE, P::ON],
        ApplicationStatus::SignalReport => [P::FLASH, P::FLASH, P::OFF],
        ApplicationStatus::RegistrationUnknown => [P::OFF, P::OFF, P::FLASH],
        ApplicationStatus::Registered => [P::OFF, P::OFF, P::ON],
        ApplicationStatus::Error => [P::ON, P::OFF, P::OFF],
        ApplicationStatus::ShuttingDown => [P::ON, P::ON, P::ON],
        ApplicationStatus::SessionConnected => [P::OFF, P::ON, P::OFF],
        ApplicationStatus::SessionDisconnected => [P::OFF, P::FLASH, P::OFF],
        ApplicationStatus::SignalReportStart => [P::ON, P::ON, P::OFF],
    }
}

/// Apply the priority rule to raw channel states.
pub fn resolve_priority(row: &PatternRow, raw: [bool; CHANNELS]) -> [bool; CHANNELS] {
    let winner = (0..CHANNELS).find(|&c| row[c].priority && raw[c]);
    match winner {
        Some(w) => core::array::from_fn(|c| c == w),
        None => raw,
    }
}

/// Resolved output of one row after `ticks` ticks from a zero phase.
/// Same answer as running a fresh [`PatternEngine`] for that many ticks.
pub fn states_after(row: &PatternRow, ticks: u32, tick_ms: u32) -> [bool; CHANNELS] {
    let mut timers = [0u32; CHANNELS];
    let mut raw = [false; CHANNELS];
    for _ in 0..ticks.saturating_add(1) {
        for c in 0..CHANNELS {
            raw[c] = row[c].is_on_at(timers[c]);
            timers[c] = row[c].advance(timers[c], tick_ms);
        }
    }
    resolve_priority(row, raw)
}

/// The status pattern table plus per-cell phase timers.
#[derive(Debug, Clone)]
pub struct PatternEngine {
    rows: [PatternRow; ApplicationStatus::COUNT],
    timers: [[u32; CHANNELS]; ApplicationStatus::COUNT],
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternEngine {
    pub fn new() -> Self {
        Self {
            rows: ApplicationStatus::ALL.map(default_row),
            timers: [[0; CHANNELS]; ApplicationStatus::COUNT],
        }
    }

    pub fn row(&self, status: ApplicationStatus) -> &PatternRow {
        &self.rows[status.index()]
    }

    /// Compute this tick's output for `status`, then advance its timers.
    pub fn tick(&mut self, status: ApplicationStatus, tick_ms: u32) -> [bool; CHANNELS] {
        let row = &self.rows[status.index()];
        let timers = &mut self.timers[status.index()];
        let mut raw = [false; CHANNELS];
        for c in 0..CHANNELS {
            raw[c] = row[c].is_on_at(timers[c]);
            timers[c] = row[c].advance(timers[c], tick_ms);
        }
        resolve_priority(row, raw)
    }

    // ── Manual overrides ──────────────────────────────────────

    /// Replace one channel of the manual row.
    pub fn set_manual_channel(&mut self, channel: usize, pattern: ChannelPattern) {
        if channel < CHANNELS {
            self.rows[ApplicationStatus::Manual.index()][channel] = pattern;
            self.timers[ApplicationStatus::Manual.index()][channel] = 0;
        }
    }

    /// Replace the whole manual row.
    pub fn set_manual(&mut self, row: PatternRow) {
        self.rows[ApplicationStatus::Manual.index()] = row;
        self.timers[ApplicationStatus::Manual.index()] = [0; CHANNELS];
    }

    /// Copy the row of `from` into the manual row.
    pub fn copy_to_manual(&mut self, from: ApplicationStatus) {
        self.rows[ApplicationStatus::Manual.index()] = self.rows[from.index()];
    }

    /// Copy the row of `from`, then replace one channel.
    pub fn add_to_manual(&mut self, from: ApplicationStatus, channel: usize, pattern: ChannelPattern) {
        self.copy_to_manual(from);
        self.set_manual_channel(channel, pattern);
    }
}
