//! Device logger.
//!
//! Implements `log::Log`, writing one line per record to stdout (the UART
//! console on the device).  Every line is prefixed with the wall-clock
//! time once the registration supervisor has synced it, otherwise with
//! the uptime in milliseconds:
//!
//! ```text
//! 14:03:27: Network registered
//! 8412: Registering on the network...
//! ```

use std::io::Write as _;
use std::sync::Arc;

use log::{LevelFilter, Log, Metadata, Record};

use crate::runtime::AppContext;

const SECS_PER_DAY: i64 = 86_400;

/// Line prefix for a record logged at `uptime_ms`, given the optional
/// wall-clock offset (unix seconds minus uptime seconds).
pub fn format_prefix(uptime_ms: u64, wall_clock_offset: Option<i64>) -> String {
    match wall_clock_offset {
        Some(offset) => {
            let unix = offset + (uptime_ms / 1000) as i64;
            let secs_of_day = unix.rem_euclid(SECS_PER_DAY);
            format!(
                "{:02}:{:02}:{:02}",
                secs_of_day / 3600,
                (secs_of_day / 60) % 60,
                secs_of_day % 60
            )
        }
        None => uptime_ms.to_string(),
    }
}

pub struct DeviceLogger {
    ctx: Arc<AppContext>,
    level: LevelFilter,
}

impl DeviceLogger {
    pub fn new(ctx: Arc<AppContext>, level: LevelFilter) -> Self {
        Self { ctx, level }
    }

    /// Install as the global logger.  A second install fails with an error.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for DeviceLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let prefix = format_prefix(
            self.ctx.clock.uptime_ms(),
            self.ctx.network.wall_clock_offset(),
        );
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}: [{}] {}", prefix, record.level(), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}
