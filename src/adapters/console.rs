//! Indicator that logs channel changes instead of driving LEDs.

use log::debug;

use crate::app::ports::IndicatorPort;
use crate::drivers::led_patterns::CHANNELS;

const NAMES: [&str; CHANNELS] = ["red", "green", "blue"];

#[derive(Debug, Default)]
pub struct ConsoleIndicator {
    state: [bool; CHANNELS],
}

impl ConsoleIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> [bool; CHANNELS] {
        self.state
    }
}

impl IndicatorPort for ConsoleIndicator {
    fn set_channel(&mut self, index: usize, on: bool) {
        let Some(slot) = self.state.get_mut(index) else {
            return;
        };
        if *slot != on {
            *slot = on;
            debug!("LED {} {}", NAMES[index], if on { "on" } else { "off" });
        }
    }
}
