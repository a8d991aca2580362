use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Command line arguments for Remote UART
#[derive(Parser, Debug)]
#[command(
    name = "remote-uart",
    version = env!("CARGO_PKG_VERSION"),
    about = "Remote UART over WebSocket",
    long_about = "Share local serial devices with remote terminals over WebSocket, or attach this terminal to a remote serial device."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Share local serial devices with remote clients
    Serve(ServeArgs),
    /// Attach this terminal to a serial device on a remote host
    Connect(ConnectArgs),
    /// List local serial ports
    Ports,
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

/// Listener arguments
#[derive(ClapArgs, Debug)]
pub struct ServeArgs {
    /// Bind address (overrides configuration)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port number (overrides configuration)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Delay between device polls in milliseconds (overrides configuration)
    #[arg(long)]
    pub poll_delay_ms: Option<u64>,
}

/// Terminal client arguments
#[derive(ClapArgs, Debug)]
pub struct ConnectArgs {
    /// Host running `remote-uart serve`
    pub host: String,

    /// Serial port path on the remote host (e.g. /dev/ttyUSB0 or COM3)
    pub serial_port: String,

    /// Baud rate (defaults to client.default_baud_rate)
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Remote port (defaults to client.port)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Directory to create the project configuration in
        #[arg(short, long)]
        dir: Option<String>,
        /// Write the global configuration instead
        #[arg(short, long)]
        global: bool,
    },
    /// Print the configuration file locations
    Path,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
        }
    }
}
