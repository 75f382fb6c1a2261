//! Domain rules for interpreting scale output and serial port listings.
//!
//! Nothing in this module performs I/O.  Port *discovery* lives in the bridge
//! crate; this module only decides which discovered ports are interesting.

pub mod ports;
pub mod weight;

pub use ports::{candidate_ports, is_usb_port, parse_choice, PortCandidates, PortInfo, UsbIds};
pub use weight::{parse_weight, WeightReading};
