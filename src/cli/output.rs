use crate::cli::args::OutputFormat;
use crate::domain::config::RemoteUartConfig;
use crate::infrastructure::serial::PortInfo;
use std::io;
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_ports(&self, ports: &[PortInfo]) -> Result<(), OutputError>;
    fn write_config(&self, config: &RemoteUartConfig) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::RemoteUartError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render ports in the writer's format.
    pub fn render_ports(&self, ports: &[PortInfo]) -> Result<String, OutputError> {
        Ok(match self.format {
            OutputFormat::Text => {
                if ports.is_empty() {
                    return Ok("No serial ports found".to_string());
                }
                ports
                    .iter()
                    .map(|port| {
                        if port.description.is_empty() {
                            format!("{} ({})", port.name, port.kind)
                        } else {
                            format!("{} ({}) {}", port.name, port.kind, port.description)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            OutputFormat::Json => serde_json::to_string_pretty(ports)?,
            OutputFormat::Table => Table::new(ports).to_string(),
        })
    }

    /// Render the configuration in the writer's format.
    pub fn render_config(&self, config: &RemoteUartConfig) -> Result<String, OutputError> {
        Ok(match self.format {
            OutputFormat::Text => toml::to_string_pretty(config)?,
            OutputFormat::Json => serde_json::to_string_pretty(config)?,
            OutputFormat::Table => Table::new(ConfigRow::from_config(config)).to_string(),
        })
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_ports(&self, ports: &[PortInfo]) -> Result<(), OutputError> {
        println!("{}", self.render_ports(ports)?);
        Ok(())
    }

    fn write_config(&self, config: &RemoteUartConfig) -> Result<(), OutputError> {
        println!("{}", self.render_config(config)?);
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "message": message });
                println!("{}", output);
            }
            _ => println!("{}", message),
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "error": error });
                eprintln!("{}", output);
            }
            _ => eprintln!("Error: {}", error),
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "Setting")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl ConfigRow {
    fn from_config(config: &RemoteUartConfig) -> Vec<Self> {
        let row = |key: &str, value: String| ConfigRow {
            key: key.to_string(),
            value,
        };
        vec![
            row("log_level", config.log_level.clone()),
            row("server.bind_addr", config.server.bind_addr.clone()),
            row("server.port", config.server.port.to_string()),
            row("server.poll_delay_ms", config.server.poll_delay_ms.to_string()),
            row("server.handshake_timeout_ms", config.server.handshake_timeout_ms.to_string()),
            row("serial.data_bits", config.serial.data_bits.to_string()),
            row("serial.stop_bits", config.serial.stop_bits.to_string()),
            row("serial.parity", format!("{:?}", config.serial.parity).to_lowercase()),
            row("serial.flow_control", format!("{:?}", config.serial.flow_control).to_lowercase()),
            row("client.default_baud_rate", config.client.default_baud_rate.to_string()),
            row("client.port", config.client.port.to_string()),
            row("client.exit_key", format!("0x{:02x}", config.client.exit_key)),
            row(
                "client.display_interprets_backspace",
                config.client.display_interprets_backspace.to_string(),
            ),
        ]
    }
}
