//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter    | Implements                         | Connects to                  |
//! |------------|------------------------------------|------------------------------|
//! | `console`  | IndicatorPort                      | Log output (host)            |
//! | `log_sink` | `log::Log`                         | stdout / UART                |
//! | `sim`      | ConnectivityPort, RadioPort,       | Simulated cellular modem     |
//! |            | ScanPort, DevicePort,              |                              |
//! |            | TimeServerPort                     |                              |
//! |            | BrokerPort                         | In-process loopback broker   |
//! | `time`     | Clock                              | ESP32 system timer / Instant |

pub mod console;
pub mod log_sink;
pub mod sim;
pub mod time;
