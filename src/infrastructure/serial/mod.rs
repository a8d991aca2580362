// Serial module - Local serial device access
pub mod device;
pub mod ports;

pub use device::{DeviceOpener, SerialDevice, SerialPortDevice, SerialPortOpener};
pub use ports::{list_ports, PortInfo};
