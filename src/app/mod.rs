//! Application boundary: port traits, device bring-up and the remote
//! control plane.

pub mod control;
pub mod device;
pub mod ports;
