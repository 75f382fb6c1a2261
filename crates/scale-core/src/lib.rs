//! # scale-core
//!
//! Shared library for the scale bridge containing the serial line protocol,
//! weight-reading parser, and serial port classification rules.
//!
//! This crate has zero dependencies on OS APIs, async runtimes, or network
//! sockets.  Everything here is pure data transformation, which keeps it easy
//! to test and benchmark.
//!
//! # Architecture overview (for beginners)
//!
//! A laboratory scale (for example a Kern balance) connects over USB and shows
//! up as a virtual serial port.  It prints one reading per line, such as
//! `"  123.45 g\r\n"`, and accepts short commands such as `"T"` (tare).
//! Browsers cannot open serial ports, so the `scale-bridge` binary relays the
//! lines over a WebSocket.  This crate is the shared foundation:
//!
//! - **`protocol`** – How bytes travel over the serial wire.  Raw chunks are
//!   reassembled into complete, trimmed lines by the [`LineAssembler`], and
//!   outbound commands get their `\r\n` terminator from [`frame_command`].
//!
//! - **`domain`** – Pure interpretation rules: extracting a numeric weight and
//!   unit from a scale line, and deciding which serial ports look like USB
//!   devices worth offering to the operator.

pub mod domain;
pub mod protocol;

pub use domain::ports::{candidate_ports, is_usb_port, parse_choice, PortCandidates, PortInfo, UsbIds};
pub use domain::weight::{parse_weight, WeightReading};
pub use protocol::line::LineAssembler;
pub use protocol::serial::{frame_command, SerialSettings};
