use crate::domain::config::{FlowControlConfig, ParityConfig, SerialLineConfig};
use crate::domain::error::{RemoteUartError, RemoteUartResult};
use crate::domain::params::ConnectionParams;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on a single read; larger backlogs are drained over several polls.
const MAX_READ_CHUNK: usize = 4096;

/// An open serial device.
///
/// Implementations own the underlying OS handle exclusively. All methods are
/// blocking calls and must be issued from a blocking-capable thread.
pub trait SerialDevice: Send {
    /// Read whatever bytes are pending without waiting. Returns an empty
    /// vector when nothing is available.
    fn read_available(&mut self) -> RemoteUartResult<Vec<u8>>;

    /// Write all of `data` to the device.
    fn write(&mut self, data: &[u8]) -> RemoteUartResult<()>;

    /// Release the device. Safe to call any number of times.
    fn close(&mut self);
}

/// Opens devices for new sessions.
pub trait DeviceOpener: Send + Sync {
    fn open(&self, params: &ConnectionParams) -> RemoteUartResult<Box<dyn SerialDevice>>;
}

/// Serial device backed by the `serialport` crate.
pub struct SerialPortDevice {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortDevice {
    fn port(&mut self) -> RemoteUartResult<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| RemoteUartError::DeviceIo(format!("device '{}' is closed", self.name)))
    }
}

impl SerialDevice for SerialPortDevice {
    fn read_available(&mut self) -> RemoteUartResult<Vec<u8>> {
        let port = self.port()?;
        let pending = port
            .bytes_to_read()
            .map_err(|e| RemoteUartError::DeviceIo(format!("Failed to query serial input queue: {}", e)))?
            as usize;
        if pending == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; pending.min(MAX_READ_CHUNK)];
        match port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(RemoteUartError::DeviceIo(format!(
                "Failed to read from serial port: {}",
                e
            ))),
        }
    }

    fn write(&mut self, data: &[u8]) -> RemoteUartResult<()> {
        let port = self.port()?;
        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| RemoteUartError::DeviceIo(format!("Failed to write to serial port: {}", e)))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Serial port '{}' closed", self.name);
        }
    }
}

impl Drop for SerialPortDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens real serial ports with the configured line settings.
#[derive(Debug, Clone, Default)]
pub struct SerialPortOpener {
    line: SerialLineConfig,
}

impl SerialPortOpener {
    pub fn new(line: SerialLineConfig) -> Self {
        Self { line }
    }
}

impl DeviceOpener for SerialPortOpener {
    fn open(&self, params: &ConnectionParams) -> RemoteUartResult<Box<dyn SerialDevice>> {
        let name = params.device.as_str();
        let unavailable = |reason: String| RemoteUartError::DeviceUnavailable {
            device: name.to_string(),
            reason,
        };

        let data_bits = match self.line.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => return Err(unavailable(format!("invalid data bits: {}", other))),
        };
        let stop_bits = match self.line.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => return Err(unavailable(format!("invalid stop bits: {}", other))),
        };
        let parity = match self.line.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };
        let flow_control = match self.line.flow_control {
            FlowControlConfig::None => serialport::FlowControl::None,
            FlowControlConfig::Software => serialport::FlowControl::Software,
            FlowControlConfig::Hardware => serialport::FlowControl::Hardware,
        };

        // Reads only ever ask for bytes already queued, so the timeout bounds writes.
        let port = serialport::new(name, params.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| unavailable(e.to_string()))?;

        debug!("Serial port '{}' opened at {} baud", name, params.baud_rate);

        Ok(Box::new(SerialPortDevice {
            name: name.to_string(),
            port: Some(port),
        }))
    }
}
