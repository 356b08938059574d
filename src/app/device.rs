//! Modem bring-up performed once, before any task starts.

use log::info;

use super::ports::DevicePort;
use crate::error::{Error, Result};

/// Open the modem and return the serial number that names this device's
/// topics.  A non-empty `serial_override` replaces the modem's own.
pub fn open_device<D: DevicePort + ?Sized>(device: &mut D, serial_override: &str) -> Result<String> {
    device.open()?;
    info!("Modem opened");

    let serial = if serial_override.is_empty() {
        normalize_serial(&device.serial_number()?)
    } else {
        normalize_serial(serial_override)
    };
    if serial.is_empty() {
        return Err(Error::ConfigurationInvalid("empty serial number"));
    }
    info!("Serial number: {}", serial);
    Ok(serial)
}

/// Modems report the serial in quotes, sometimes with a trailing CR/LF.
pub fn normalize_serial(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}
