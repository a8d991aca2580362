use crate::domain::error::{RemoteUartError, RemoteUartResult};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};
use std::io::Read;
use tracing::{debug, warn};

/// Puts the terminal into raw mode (no line buffering, no echo) for as long
/// as the guard lives. The previous mode is restored on drop.
pub struct RawModeGuard {
    was_enabled: bool,
}

impl RawModeGuard {
    pub fn acquire() -> RemoteUartResult<Self> {
        let was_enabled = is_raw_mode_enabled()
            .map_err(|e| RemoteUartError::Terminal(format!("Failed to query terminal mode: {}", e)))?;
        if !was_enabled {
            enable_raw_mode()
                .map_err(|e| RemoteUartError::Terminal(format!("Failed to enable raw mode: {}", e)))?;
            debug!("Terminal raw mode enabled");
        }
        Ok(Self { was_enabled })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.was_enabled {
            return;
        }
        match disable_raw_mode() {
            Ok(()) => debug!("Terminal raw mode restored"),
            Err(e) => warn!("Failed to restore terminal mode: {}", e),
        }
    }
}

/// Source of raw keystroke bytes. `read_key` blocks until a byte arrives;
/// `Ok(None)` means the input has ended.
pub trait KeySource: Send {
    fn read_key(&mut self) -> RemoteUartResult<Option<u8>>;
}

/// Reads single bytes from standard input.
#[derive(Debug, Default)]
pub struct StdinKeySource;

impl KeySource for StdinKeySource {
    fn read_key(&mut self) -> RemoteUartResult<Option<u8>> {
        let mut byte = [0u8; 1];
        let stdin = std::io::stdin();
        let mut handle = stdin.lock();
        loop {
            match handle.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(RemoteUartError::Terminal(format!(
                        "Failed to read from terminal: {}",
                        e
                    )))
                }
            }
        }
    }
}
