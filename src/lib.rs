//! CellNode runtime library.
//!
//! Exposes the task runtime, the application tasks and the adapters for
//! integration testing and for the binary.  ESP-IDF specific code is
//! guarded by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod network;
pub mod runtime;
pub mod status;
pub mod tasks;
