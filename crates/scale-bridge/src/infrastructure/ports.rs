//! Serial port discovery via the `serialport` crate.
//!
//! Converts the OS listing into [`PortInfo`] values so the classification and
//! menu logic in `scale-core` and `application::setup` never touch
//! `serialport` types directly.

use scale_core::{PortInfo, UsbIds};
use serialport::{SerialPortInfo, SerialPortType};
use tracing::debug;

/// Lists the serial ports currently present on this machine.
///
/// # Errors
///
/// Returns the `serialport` error if the OS listing itself fails.  An empty
/// list is not an error.
pub fn discover_ports() -> Result<Vec<PortInfo>, serialport::Error> {
    let ports: Vec<PortInfo> = serialport::available_ports()?
        .into_iter()
        .map(port_info)
        .collect();
    debug!("discovered {} serial port(s)", ports.len());
    Ok(ports)
}

fn port_info(port: SerialPortInfo) -> PortInfo {
    match port.port_type {
        SerialPortType::UsbPort(usb) => PortInfo {
            description: usb_description(usb.product.as_deref(), usb.manufacturer.as_deref()),
            usb_ids: Some(UsbIds {
                vid: usb.vid,
                pid: usb.pid,
            }),
            device: port.port_name,
        },
        other => PortInfo {
            description: type_description(&other).to_string(),
            usb_ids: None,
            device: port.port_name,
        },
    }
}

/// Product name if known, else manufacturer, else a generic label.
fn usb_description(product: Option<&str>, manufacturer: Option<&str>) -> String {
    product
        .or(manufacturer)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("USB serial device")
        .to_string()
}

fn type_description(port_type: &SerialPortType) -> &'static str {
    match port_type {
        SerialPortType::UsbPort(_) => "USB serial device",
        SerialPortType::PciPort => "PCI serial port",
        SerialPortType::BluetoothPort => "Bluetooth serial port",
        SerialPortType::Unknown => "n/a",
    }
}
