//! Picking the board among attached serial ports by description.

use tokio_serial::{SerialPortInfo, SerialPortType};
use tracing::{debug, info};

/// Human-readable description of a port, similar to what OS device managers show.
pub fn describe_port(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let parts: Vec<&str> = [usb.manufacturer.as_deref(), usb.product.as_deref()]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                "USB Serial Device".to_string()
            } else {
                parts.join(" ")
            }
        }
        SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        SerialPortType::PciPort => "PCI Serial".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}

pub fn matches_descriptor(description: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| description.contains(p.as_str()))
}

/// First port whose description contains one of `patterns`.
pub fn find_port(patterns: &[String]) -> Option<String> {
    let ports = match tokio_serial::available_ports() {
        Ok(ports) => ports,
        Err(err) => {
            debug!(?err, "Could not enumerate serial ports");
            return None;
        }
    };
    select_port(&ports, patterns)
}

fn select_port(ports: &[SerialPortInfo], patterns: &[String]) -> Option<String> {
    for port in ports {
        let description = describe_port(port);
        debug!(port = %port.port_name, %description, "Probing serial port");
        if matches_descriptor(&description, patterns) {
            info!(port = %port.port_name, %description, "Matched serial device");
            return Some(port.port_name.clone());
        }
    }
    None
}
