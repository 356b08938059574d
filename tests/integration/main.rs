//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! the simulated modem, the loopback broker and the recording mocks.
//! All tests run on the host with no real hardware required.

mod lifecycle_tests;
mod mock_hw;
mod scan_tests;
mod session_tests;
mod supervisor_tests;
