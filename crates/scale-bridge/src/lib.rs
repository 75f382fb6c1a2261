//! scale-bridge library crate.
//!
//! This crate provides a WebSocket-to-serial relay that lets a browser page
//! drive a laboratory scale attached over USB.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (text frames over WebSocket, ws://localhost:8765)
//!         ↕
//! [scale-bridge]
//!   ├── domain/           BridgeConfig, InfluxConfig, TOML config file
//!   ├── application/      Frame classification, MetricsSink, startup prompts
//!   └── infrastructure/
//!         ├── ws_server/  Accept loop, one active session at a time
//!         ├── relay/      Serial → WebSocket and WebSocket → serial
//!         ├── serial/     Serial device with a dedicated reader thread
//!         ├── ports/      OS serial port listing
//!         └── influx/     Batched InfluxDB writer
//!         ↕
//! Scale (line-oriented ASCII over a 9600 baud serial port)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `scale-core`; its only I/O is the
//!   generic reader/writer pair handed to the prompts.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tokio-tungstenite`, `serialport`, and `reqwest`.
//!
//! # For beginners: why a library plus a binary?
//!
//! Everything except argument parsing lives in this library so the
//! integration tests under `tests/` can run a real WebSocket server against a
//! fake serial device without spawning the binary.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: frame handling, metrics port, startup prompts.
pub mod application;

/// Infrastructure layer: serial device, WebSocket server, InfluxDB writer.
pub mod infrastructure;
