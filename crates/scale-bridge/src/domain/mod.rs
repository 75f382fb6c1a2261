//! Domain layer for scale-bridge.
//!
//! Pure configuration types with no dependencies on I/O, networking, or the
//! async runtime.  Scale-specific parsing rules live in `scale-core`; this
//! layer only describes how the bridge process itself is configured.

pub mod config;

pub use config::{BridgeConfig, ConfigError, FileConfig, InfluxConfig};
