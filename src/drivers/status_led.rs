//! RGB status indicator on three GPIO outputs.
//!
//! Implements [`IndicatorPort`] for any three `embedded_hal` output pins,
//! so the same driver runs on ESP-IDF `PinDriver`s and on host mocks.
//! Pin errors are logged and otherwise ignored: a stuck LED must not take
//! the indicator task down.

use embedded_hal::digital::{Error as _, OutputPin};
use log::warn;

use crate::app::ports::IndicatorPort;
use crate::drivers::led_patterns::CHANNELS;

pub struct PinIndicator<P: OutputPin> {
    pins: [P; CHANNELS],
    /// Pins are wired active-low (common-anode LED).
    active_low: bool,
    current: [bool; CHANNELS],
}

impl<P: OutputPin> PinIndicator<P> {
    pub fn new(red: P, green: P, blue: P) -> Self {
        Self {
            pins: [red, green, blue],
            active_low: false,
            current: [false; CHANNELS],
        }
    }

    pub fn active_low(mut self) -> Self {
        self.active_low = true;
        self
    }

    pub fn current(&self) -> [bool; CHANNELS] {
        self.current
    }

    pub fn into_pins(self) -> [P; CHANNELS] {
        self.pins
    }
}

impl<P: OutputPin + Send> IndicatorPort for PinIndicator<P> {
    fn set_channel(&mut self, index: usize, on: bool) {
        let Some(pin) = self.pins.get_mut(index) else {
            return;
        };
        let high = on != self.active_low;
        let result = if high { pin.set_high() } else { pin.set_low() };
        match result {
            Ok(()) => self.current[index] = on,
            Err(e) => warn!("indicator channel {}: pin error {:?}", index, e.kind()),
        }
    }
}
