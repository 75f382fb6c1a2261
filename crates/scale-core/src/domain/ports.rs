//! Classification of discovered serial ports.
//!
//! A scale connects over USB and presents a virtual serial port.  Machines
//! usually expose several unrelated ports as well (built-in UARTs, Bluetooth
//! modems), so the bridge offers USB ports first and only falls back to the
//! full list when no USB device is present.

use std::fmt;

/// Device-name fragments that identify USB serial adapters when the OS does
/// not report a VID/PID.
///
/// Linux: `/dev/ttyUSB*`, `/dev/ttyACM*`.  macOS: `/dev/cu.usbserial-*`,
/// `/dev/cu.usbmodem*`, `/dev/cu.wchusbserial*`.
const USB_NAME_HINTS: [&str; 4] = ["ttyusb", "ttyacm", "cu.usb", "cu.wch"];

/// USB vendor and product identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbIds {
    pub vid: u16,
    pub pid: u16,
}

/// One serial port as reported by the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path used to open the port.
    pub device: String,
    /// Human-readable description (product name, port type).
    pub description: String,
    /// VID/PID when the OS identified the port as a USB device.
    pub usb_ids: Option<UsbIds>,
}

impl fmt::Display for PortInfo {
    /// Formats as `"<device>  —  <description>"`, plus `VID:PID=xxxx:xxxx`
    /// when known.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  —  {}", self.device, self.description)?;
        if let Some(ids) = self.usb_ids {
            write!(f, "  VID:PID={:04X}:{:04X}", ids.vid, ids.pid)?;
        }
        Ok(())
    }
}

/// Returns `true` if `port` looks like a USB serial device.
///
/// VID/PID is checked first (most reliable), then the device name, for systems
/// where the OS listing does not carry USB metadata.
pub fn is_usb_port(port: &PortInfo) -> bool {
    if port.usb_ids.is_some() {
        return true;
    }
    let name = port.device.to_lowercase();
    USB_NAME_HINTS.iter().any(|hint| name.contains(hint))
}

/// Ports to offer the operator, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidates {
    pub ports: Vec<PortInfo>,
    /// `true` when `ports` was narrowed down to USB devices.
    pub usb_only: bool,
}

/// Keeps only USB ports if there are any, otherwise returns every port.
pub fn candidate_ports(all: Vec<PortInfo>) -> PortCandidates {
    let usb: Vec<PortInfo> = all.iter().filter(|p| is_usb_port(p)).cloned().collect();
    if usb.is_empty() {
        PortCandidates {
            ports: all,
            usb_only: false,
        }
    } else {
        PortCandidates {
            ports: usb,
            usb_only: true,
        }
    }
}

/// Parses an operator's 1-based menu choice into a 0-based index.
///
/// Returns `None` for non-numbers and out-of-range values.
pub fn parse_choice(input: &str, count: usize) -> Option<usize> {
    let choice: usize = input.trim().parse().ok()?;
    (1..=count).contains(&choice).then(|| choice - 1)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
