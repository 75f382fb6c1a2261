//! Infrastructure layer for scale-bridge.
//!
//! The infrastructure layer handles all I/O: the serial device, the WebSocket
//! listener, and the InfluxDB HTTP API.
//!
//! # Responsibilities
//!
//! - Listing serial ports and opening the chosen device (`ports`, `serial`)
//! - Keeping blocking serial reads off the async runtime (`serial`)
//! - Binding the WebSocket listener and arbitrating the single session (`ws_server`)
//! - Running the two relay directions of a session (`relay`)
//! - Batching weight readings to InfluxDB (`influx`)
//!
//! # What does NOT belong here?
//!
//! - Line assembly and weight parsing (that is `scale-core`)
//! - Frame classification and prompts (that is the application layer)
//! - Configuration merging (that is done in `main.rs`)

pub mod influx;
pub mod ports;
pub mod relay;
pub mod serial;
pub mod ws_server;

pub use influx::{check_health, InfluxSink, MetricsError};
pub use ports::discover_ports;
pub use relay::{RelaySession, SessionEnd};
pub use serial::{SerialChannel, SerialError};
pub use ws_server::{run_server, serve};
