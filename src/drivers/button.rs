//! Edge-triggered button driver with short, long, and double press detection.
//!
//! ## Hardware
//!
//! Active-low momentary switch with pull-up.  The falling-edge interrupt
//! (or a polling thread on the host) calls [`ButtonEdge::record`], which
//! stores the edge timestamp in an atomic.  [`ButtonDriver::tick`], called
//! periodically, runs the debounce and gesture state machine against the
//! pin level.
//!
//! ## Gesture detection
//!
//! | Gesture      | Condition                              | Action             |
//! |-------------|----------------------------------------|--------------------|
//! | Short press | Released, no second press < 300ms      | `NETWORK_SCAN`     |
//! | Long press  | Hold >= 5s                             | `SHUTDOWN`         |
//! | Double press| Two presses within 300ms gap           | `MEASURE_NOW`      |

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use embedded_hal::digital::InputPin;

use crate::app::control::ControlCommand;

const DEBOUNCE_MS: u32 = 50;
const LONG_PRESS_MS: u32 = 5000;
const DOUBLE_PRESS_WINDOW_MS: u32 = 300;

/// Button events emitted after gesture classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
    DoublePress,
}

impl ButtonEvent {
    /// Control command bound to this gesture.
    pub const fn command(self) -> ControlCommand {
        match self {
            Self::ShortPress => ControlCommand::NetworkScan,
            Self::LongPress => ControlCommand::Shutdown,
            Self::DoublePress => ControlCommand::MeasureNow,
        }
    }
}

/// Interrupt-side handle: records the time of the latest falling edge.
#[derive(Debug, Clone, Default)]
pub struct ButtonEdge(Arc<AtomicU32>);

impl ButtonEdge {
    /// Safe from interrupt context (single atomic store).
    pub fn record(&self, now_ms: u32) {
        // Zero means "no edge yet".
        self.0.store(now_ms.max(1), Ordering::Release);
    }

    fn last(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    DebounceWait { since_ms: u32 },
    Pressed { since_ms: u32 },
    WaitSecondPress { first_release_ms: u32 },
}

pub struct ButtonDriver<P: InputPin> {
    pin: P,
    edge: ButtonEdge,
    state: GestureState,
    seen_edge_ms: u32,
    was_pressed: bool,
}

impl<P: InputPin> ButtonDriver<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            edge: ButtonEdge::default(),
            state: GestureState::Idle,
            seen_edge_ms: 0,
            was_pressed: false,
        }
    }

    /// Handle to give to the interrupt / edge source.
    pub fn edge(&self) -> ButtonEdge {
        self.edge.clone()
    }

    /// Advance the gesture machine.  `now_ms` is monotonic milliseconds.
    pub fn tick(&mut self, now_ms: u32) -> Option<ButtonEvent> {
        let edge_ms = self.edge.last();
        let new_edge = edge_ms != 0 && edge_ms != self.seen_edge_ms;
        if new_edge {
            self.seen_edge_ms = edge_ms;
        }

        match self.state {
            GestureState::Idle => {
                if new_edge {
                    self.state = GestureState::DebounceWait { since_ms: now_ms };
                }
                None
            }

            GestureState::DebounceWait { since_ms } => {
                if now_ms.wrapping_sub(since_ms) >= DEBOUNCE_MS {
                    self.state = if self.is_pressed() {
                        GestureState::Pressed { since_ms }
                    } else {
                        // Bounce without a hold still counts as a press.
                        GestureState::WaitSecondPress {
                            first_release_ms: now_ms,
                        }
                    };
                }
                None
            }

            GestureState::Pressed { since_ms } => {
                if now_ms.wrapping_sub(since_ms) >= LONG_PRESS_MS {
                    self.state = GestureState::Idle;
                    return Some(ButtonEvent::LongPress);
                }
                if !self.is_pressed() {
                    self.state = GestureState::WaitSecondPress {
                        first_release_ms: now_ms,
                    };
                }
                None
            }

            GestureState::WaitSecondPress { first_release_ms } => {
                let gap = now_ms.wrapping_sub(first_release_ms);
                if new_edge && gap <= DOUBLE_PRESS_WINDOW_MS {
                    self.state = GestureState::Idle;
                    return Some(ButtonEvent::DoublePress);
                }
                if gap > DOUBLE_PRESS_WINDOW_MS {
                    self.state = GestureState::Idle;
                    return Some(ButtonEvent::ShortPress);
                }
                None
            }
        }
    }

    /// Polling variant of [`tick`](Self::tick) for pins without an edge
    /// interrupt: a released to pressed transition is recorded as an edge.
    pub fn poll(&mut self, now_ms: u32) -> Option<ButtonEvent> {
        let pressed = self.is_pressed();
        if pressed && !self.was_pressed {
            self.edge.record(now_ms);
        }
        self.was_pressed = pressed;
        self.tick(now_ms)
    }

    fn is_pressed(&mut self) -> bool {
        self.pin.is_low().unwrap_or(false)
    }
}
