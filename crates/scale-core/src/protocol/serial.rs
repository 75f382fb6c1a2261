//! Serial line settings and command framing for Kern-style scales.
//!
//! The scale's serial interface is fixed at 9600 baud, 8 data bits, no parity,
//! 1 stop bit ("9600 8N1") with no flow control.  Only the device path and the
//! read timeout vary between installations.

use std::time::Duration;

/// Baud rate used by the scale's RS-232/USB interface.
pub const BAUD_RATE: u32 = 9600;

/// How long a single serial read may block before returning empty.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum number of bytes requested per serial read.
pub const READ_CHUNK_SIZE: usize = 256;

/// Delay between serial reads that returned no data.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Terminator appended to every command sent to the scale.
pub const COMMAND_TERMINATOR: &str = "\r\n";

/// Connection parameters for one serial device.
///
/// Data format is always 8N1; see the module docs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// OS device path, e.g. `/dev/ttyUSB0`, `/dev/cu.usbserial-10`, or `COM3`.
    pub path: String,
    /// Line speed in bits per second.
    pub baud_rate: u32,
    /// Upper bound on how long one read call blocks.
    pub read_timeout: Duration,
}

impl SerialSettings {
    /// Returns the scale's default settings for the device at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: BAUD_RATE,
            read_timeout: READ_TIMEOUT,
        }
    }
}

/// Encodes a command for the serial wire by appending `\r\n`.
///
/// The command is sent as-is otherwise; callers trim it first.
///
/// ```rust
/// assert_eq!(scale_core::frame_command("T"), b"T\r\n".to_vec());
/// ```
pub fn frame_command(command: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(command.len() + COMMAND_TERMINATOR.len());
    payload.extend_from_slice(command.as_bytes());
    payload.extend_from_slice(COMMAND_TERMINATOR.as_bytes());
    payload
}

// ── Tests ─────────────────────────────────────────────────────────────────────
