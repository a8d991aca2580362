use crate::domain::error::{RemoteUartError, RemoteUartResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote UART configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteUartConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Serial line settings applied when a device is opened
    #[serde(default)]
    pub serial: SerialLineConfig,
    /// Terminal client settings
    #[serde(default)]
    pub client: ClientConfig,
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the listener to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Delay between polls of the device input queue, in milliseconds
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,
    /// How long a new connection may take to complete the WebSocket upgrade
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

/// Serial line framing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialLineConfig {
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: ParityConfig,
    #[serde(default)]
    pub flow_control: FlowControlConfig,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    #[default]
    None,
    Odd,
    Even,
}

/// Flow control configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlConfig {
    #[default]
    None,
    Hardware,
    Software,
}

/// Terminal client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Baud rate requested when none is given on the command line
    #[serde(default = "default_baud_rate")]
    pub default_baud_rate: u32,
    /// Remote listener port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Keystroke byte that ends the session locally (default Ctrl+])
    #[serde(default = "default_exit_key")]
    pub exit_key: u8,
    /// Whether the local display erases on a bare backspace
    #[serde(default)]
    pub display_interprets_backspace: bool,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_poll_delay_ms() -> u64 {
    1
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_exit_key() -> u8 {
    0x1D
}

impl Default for RemoteUartConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            serial: SerialLineConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            poll_delay_ms: default_poll_delay_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl Default for SerialLineConfig {
    fn default() -> Self {
        Self {
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: ParityConfig::None,
            flow_control: FlowControlConfig::None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_baud_rate: default_baud_rate(),
            port: default_port(),
            exit_key: default_exit_key(),
            display_interprets_backspace: false,
        }
    }
}

impl ServerConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl RemoteUartConfig {
    /// Reject values no component can work with.
    pub fn validate(&self) -> RemoteUartResult<()> {
        if self.server.port == 0 {
            return Err(config_error("server.port must be non-zero"));
        }
        if self.server.poll_delay_ms == 0 {
            return Err(config_error("server.poll_delay_ms must be at least 1"));
        }
        if self.server.handshake_timeout_ms == 0 {
            return Err(config_error("server.handshake_timeout_ms must be at least 1"));
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(config_error(format!(
                "serial.data_bits must be between 5 and 8, got {}",
                self.serial.data_bits
            )));
        }
        if !(1..=2).contains(&self.serial.stop_bits) {
            return Err(config_error(format!(
                "serial.stop_bits must be 1 or 2, got {}",
                self.serial.stop_bits
            )));
        }
        if self.client.default_baud_rate == 0 {
            return Err(config_error("client.default_baud_rate must be positive"));
        }
        if self.client.port == 0 {
            return Err(config_error("client.port must be non-zero"));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> RemoteUartError {
    RemoteUartError::Config {
        message: message.into(),
    }
}
