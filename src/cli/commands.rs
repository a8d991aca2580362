use crate::cli::args::{Args, Command, ConfigArgs, ConfigCommand, ConnectArgs, ServeArgs};
use crate::cli::output::{ConsoleWriter, OutputWriter};
use crate::core::client::{ClientExit, TerminalClient};
use crate::core::listener::Listener;
use crate::core::registry::DeviceRegistry;
use crate::domain::config::RemoteUartConfig;
use crate::domain::params::ConnectionParams;
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::{list_ports, SerialPortOpener};
use crate::infrastructure::terminal::{RawModeGuard, StdinKeySource};
use crate::infrastructure::transport::websocket;
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Execute CLI command
pub async fn execute_command(args: Args) -> anyhow::Result<()> {
    let writer = ConsoleWriter::new(args.output.clone());

    let config_manager = ConfigManager::new()?;
    let config = if let Some(config_path) = &args.config {
        config_manager.load_config_from_path(config_path.as_ref())?
    } else {
        config_manager.load_config()?
    };

    if !args.quiet {
        init_logging(&config.log_level, args.verbose)?;
    }

    match args.command {
        Command::Serve(serve_args) => execute_serve_command(serve_args, &writer, config).await,
        Command::Connect(connect_args) => execute_connect_command(connect_args, &writer, &config).await,
        Command::Ports => {
            let ports = list_ports()?;
            writer.write_ports(&ports)?;
            Ok(())
        }
        Command::Config(config_args) => execute_config_command(config_args, &writer, &config, &config_manager),
        Command::Version => {
            writer.write_message(&format!("remote-uart {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

async fn execute_serve_command(
    args: ServeArgs,
    writer: &ConsoleWriter,
    mut config: RemoteUartConfig,
) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(poll_delay_ms) = args.poll_delay_ms {
        config.server.poll_delay_ms = poll_delay_ms;
    }
    config.validate()?;

    let registry = Arc::new(DeviceRegistry::new());
    let opener = Arc::new(SerialPortOpener::new(config.serial.clone()));
    let listener = Listener::bind(&config.server, registry, opener)
        .await
        .with_context(|| format!("Failed to listen on {}", config.server.listen_addr()))?;

    writer.write_message(&format!(
        "Sharing serial devices on ws://{} (Ctrl+C to stop)",
        listener.local_addr()
    ))?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, closing sessions"),
            Err(e) => warn!("Failed to listen for interrupt: {}", e),
        }
        signal.cancel();
    });

    listener.run(shutdown).await?;
    writer.write_message("Listener stopped")?;
    Ok(())
}

async fn execute_connect_command(
    args: ConnectArgs,
    writer: &ConsoleWriter,
    config: &RemoteUartConfig,
) -> anyhow::Result<()> {
    let baud_rate = args.baud.unwrap_or(config.client.default_baud_rate);
    let port = args.port.unwrap_or(config.client.port);
    let url = ConnectionParams::new(args.serial_port.as_str(), baud_rate)?.to_url(&args.host, port)?;

    let connection = websocket::connect(&url)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;

    let client = TerminalClient::new(&config.client);
    let exit_hint = client
        .exit_key()
        .map(|key| format!(", {} to exit", describe_key(key)))
        .unwrap_or_default();
    writer.write_message(&format!(
        "Connected to {} on {} at {} baud{}",
        args.serial_port, args.host, baud_rate, exit_hint
    ))?;

    let report = {
        let _raw_mode = RawModeGuard::acquire()?;
        client
            .run(connection, StdinKeySource, tokio::io::stdout(), CancellationToken::new())
            .await
    };

    info!(
        "Client finished: {} ({} bytes sent, {} bytes received)",
        report.exit, report.bytes_sent, report.bytes_received
    );

    match report.exit {
        ClientExit::Failed(e) => Err(e).context("Terminal session failed"),
        exit => {
            writer.write_message(&format!("\r\nDisconnected: {}", exit))?;
            Ok(())
        }
    }
}

fn execute_config_command(
    args: ConfigArgs,
    writer: &ConsoleWriter,
    config: &RemoteUartConfig,
    config_manager: &ConfigManager,
) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
            Ok(())
        }
        ConfigCommand::Init { dir, global } => {
            if global {
                let global_path = config_manager.get_global_config_path_ref();
                if let Some(parent) = global_path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create '{}'", parent.display()))?;
                }
                config_manager.save_config_to_path(global_path, &RemoteUartConfig::default())?;
                writer.write_message(&format!(
                    "Global configuration initialized at '{}'",
                    global_path.display()
                ))?;
            } else {
                let dir: PathBuf = match dir {
                    Some(dir) => dir.into(),
                    None => std::env::current_dir().context("Failed to get current directory")?,
                };
                let created = config_manager.init_project_config(&dir)?;
                writer.write_message(&format!(
                    "Project configuration initialized at '{}'",
                    created.display()
                ))?;
            }
            Ok(())
        }
        ConfigCommand::Path => {
            writer.write_message(&format!(
                "Global:  {}",
                config_manager.get_global_config_path_ref().display()
            ))?;
            let project = config_manager
                .get_project_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string());
            writer.write_message(&format!("Project: {}", project))?;
            Ok(())
        }
    }
}

/// Human-readable name for a control key byte, e.g. `Ctrl+]` for 0x1D.
fn describe_key(key: u8) -> String {
    if key < 0x20 {
        format!("Ctrl+{}", (key + 0x40) as char)
    } else {
        format!("'{}'", key.escape_ascii())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_key() {
        assert_eq!(describe_key(0x1D), "Ctrl+]");
        assert_eq!(describe_key(0x03), "Ctrl+C");
        assert_eq!(describe_key(b'q'), "'q'");
    }
}
