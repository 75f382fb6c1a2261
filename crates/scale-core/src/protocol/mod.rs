//! Serial line protocol: line reassembly and command framing.

pub mod line;
pub mod serial;

pub use line::{LineAssembler, Lines};
pub use serial::{frame_command, SerialSettings};
