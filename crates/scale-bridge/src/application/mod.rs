//! Application layer for scale-bridge.
//!
//! The application layer knows *what* the bridge does with data, but
//! delegates *how* bytes move to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Interpreting browser frames as scale commands (`relay_service`)
//! - The `MetricsSink` port and InfluxDB line-protocol encoding (`metrics`)
//! - Interactive startup prompts for port choice and InfluxDB (`setup`)
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or serial devices (that is infrastructure)
//! - Tokio task spawning (that happens in the infrastructure layer)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod metrics;
pub mod relay_service;
pub mod setup;

pub use metrics::{line_protocol, MetricsSink, NoopSink};
pub use relay_service::{classify_frame, is_disconnect, InboundFrame, RelayError};
pub use setup::{prompt_influx_config, select_port, TokenEntry};
