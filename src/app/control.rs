//! Remote control plane.
//!
//! Text commands arrive on the device's control topic
//! (`/<serial>/Control`), on stdin in the host build, and from the
//! buttons.  Every line has the form `command_name [param...]`.
//!
//! | Command        | Action                                          |
//! |----------------|-------------------------------------------------|
//! | `MEASURE_NOW`  | signal report immediately, skipping the dwell   |
//! | `NETWORK_SCAN` | start a network scan, or cancel the running one |
//! | `SHUTDOWN`     | set the application shutdown flag               |
//!
//! Unknown commands are logged and ignored.

use core::fmt;

use heapless::Vec;
use log::{info, warn};

use crate::error::Result;
use crate::runtime::ShutdownFlag;
use crate::tasks::scan::{ScanMsg, ScanQueue};
use crate::tasks::signal::{SignalMsg, SignalQueue};

/// Parameters beyond this count are rejected.
pub const MAX_CONTROL_PARAMS: usize = 4;

/// Commands understood by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    MeasureNow,
    NetworkScan,
    Shutdown,
}

/// A tokenised command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub name: &'a str,
    pub params: Vec<&'a str, MAX_CONTROL_PARAMS>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError<'a> {
    Empty,
    TooManyParams,
    Unknown(&'a str),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::TooManyParams => write!(f, "more than {} parameters", MAX_CONTROL_PARAMS),
            Self::Unknown(name) => write!(f, "unknown command '{}'", name),
        }
    }
}

/// Split `text` into a command name and its parameters.
pub fn tokenize(text: &str) -> core::result::Result<CommandLine<'_>, ParseError<'_>> {
    let mut words = text.split_whitespace();
    let name = words.next().ok_or(ParseError::Empty)?;
    let mut params = Vec::new();
    for word in words {
        params.push(word).map_err(|_| ParseError::TooManyParams)?;
    }
    Ok(CommandLine { name, params })
}

impl ControlCommand {
    pub fn parse(text: &str) -> core::result::Result<Self, ParseError<'_>> {
        let line = tokenize(text)?;
        match line.name {
            "MEASURE_NOW" => Ok(Self::MeasureNow),
            "NETWORK_SCAN" => Ok(Self::NetworkScan),
            "SHUTDOWN" => Ok(Self::Shutdown),
            other => Err(ParseError::Unknown(other)),
        }
    }
}

/// Routes control commands to the task that carries them out.
#[derive(Clone)]
pub struct ControlRouter {
    shutdown: ShutdownFlag,
    signal: SignalQueue,
    scan: ScanQueue,
}

impl ControlRouter {
    pub fn new(shutdown: ShutdownFlag, signal: SignalQueue, scan: ScanQueue) -> Self {
        Self {
            shutdown,
            signal,
            scan,
        }
    }

    pub fn execute(&self, command: ControlCommand) -> Result<()> {
        info!("Control: {:?}", command);
        match command {
            ControlCommand::MeasureNow => self.signal.send(SignalMsg::MeasureNow),
            ControlCommand::NetworkScan => self.scan.send(ScanMsg::Start),
            ControlCommand::Shutdown => {
                self.shutdown.request();
                Ok(())
            }
        }
    }

    /// Parse and execute one raw command line.  Failures are logged.
    pub fn handle_text(&self, text: &str) {
        match ControlCommand::parse(text) {
            Ok(command) => {
                if let Err(e) = self.execute(command) {
                    warn!("Control: {:?} dropped: {}", command, e);
                }
            }
            Err(ParseError::Empty) => {}
            Err(e) => warn!("Control: ignoring '{}': {}", text.trim(), e),
        }
    }
}
