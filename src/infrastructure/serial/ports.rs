use crate::domain::error::RemoteUartResult;
use serde::Serialize;
use serialport::SerialPortType;
use tabled::Tabled;

/// A serial port present on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct PortInfo {
    #[tabled(rename = "Port")]
    pub name: String,
    #[tabled(rename = "Type")]
    pub kind: String,
    #[tabled(rename = "Description")]
    pub description: String,
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let (kind, description) = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let product = usb
                    .product
                    .or(usb.manufacturer)
                    .unwrap_or_default();
                (
                    "usb".to_string(),
                    format!("{:04x}:{:04x} {}", usb.vid, usb.pid, product).trim_end().to_string(),
                )
            }
            SerialPortType::PciPort => ("pci".to_string(), String::new()),
            SerialPortType::BluetoothPort => ("bluetooth".to_string(), String::new()),
            SerialPortType::Unknown => ("unknown".to_string(), String::new()),
        };

        Self {
            name: info.port_name,
            kind,
            description,
        }
    }
}

/// Enumerate local serial ports, sorted by name.
pub fn list_ports() -> RemoteUartResult<Vec<PortInfo>> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()?
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ports)
}
