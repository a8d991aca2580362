// Logging module - Logging infrastructure
use crate::domain::error::{RemoteUartError, RemoteUartResult};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter used when `RUST_LOG` is not set.
pub fn default_filter(level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { level };
    format!("remote_uart={},warn", level)
}

/// Initialize logging system
///
/// Logs always go to stderr so the terminal client's display stays clean.
pub fn init_logging(level: &str, verbose: bool) -> RemoteUartResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level, verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(verbose)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .try_init()
        .map_err(|e| RemoteUartError::Config {
            message: format!("Failed to initialize logging: {}", e),
        })?;

    tracing::debug!("Remote UART logging system initialized");
    Ok(())
}
