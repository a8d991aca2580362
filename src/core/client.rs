//! Outbound side: an interactive terminal attached to a remote device.

use crate::domain::config::ClientConfig;
use crate::domain::error::{RemoteUartError, RemoteUartResult};
use crate::infrastructure::terminal::KeySource;
use crate::infrastructure::transport::{Connection, FrameReceiver, FrameSender, CLOSE_TIMEOUT};
use std::borrow::Cow;
use std::fmt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEL: u8 = 0x7F;
pub const BACKSPACE: u8 = 0x08;
/// Back up, blank the cell, back up again.
pub const ERASE_SEQUENCE: &[u8] = b"\x08 \x08";

/// Map a keystroke to the byte sent to the device. Terminals send DEL for
/// the backspace key; serial consoles expect BS.
pub fn translate_keystroke(byte: u8) -> u8 {
    if byte == DEL {
        BACKSPACE
    } else {
        byte
    }
}

/// Prepare received bytes for the local display.
pub fn render_incoming(data: &[u8], display_interprets_backspace: bool) -> Cow<'_, [u8]> {
    if display_interprets_backspace || !data.contains(&DEL) {
        return Cow::Borrowed(data);
    }

    let mut rendered = Vec::with_capacity(data.len() + 2 * ERASE_SEQUENCE.len());
    for &byte in data {
        if byte == DEL {
            rendered.extend_from_slice(ERASE_SEQUENCE);
        } else {
            rendered.push(byte);
        }
    }
    Cow::Owned(rendered)
}

/// Why a client session ended.
#[derive(Debug)]
pub enum ClientExit {
    /// The user pressed the exit key
    ExitKey,
    /// The keystroke source reached end of input
    InputEnded,
    /// The remote side closed the connection
    ConnectionClosed,
    /// Stopped from outside
    Cancelled,
    Failed(RemoteUartError),
}

impl fmt::Display for ClientExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientExit::ExitKey => write!(f, "exit key pressed"),
            ClientExit::InputEnded => write!(f, "input ended"),
            ClientExit::ConnectionClosed => write!(f, "connection closed"),
            ClientExit::Cancelled => write!(f, "cancelled"),
            ClientExit::Failed(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug)]
pub struct ClientReport {
    pub exit: ClientExit,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Pipes keystrokes to a remote device and its output to a display.
#[derive(Debug, Clone)]
pub struct TerminalClient {
    exit_key: Option<u8>,
    display_interprets_backspace: bool,
}

impl TerminalClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            exit_key: Some(config.exit_key),
            display_interprets_backspace: config.display_interprets_backspace,
        }
    }

    /// Disable the local exit key; the session then ends only with the input
    /// or the connection.
    pub fn without_exit_key(mut self) -> Self {
        self.exit_key = None;
        self
    }

    pub fn exit_key(&self) -> Option<u8> {
        self.exit_key
    }

    /// Run the input and display directions until either ends or `cancel`
    /// fires, then close the connection.
    pub async fn run<K, W>(
        &self,
        connection: Connection,
        keys: K,
        display: W,
        cancel: CancellationToken,
    ) -> ClientReport
    where
        K: KeySource + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Connection {
            sender, receiver, ..
        } = connection;
        let keys = match spawn_key_reader(keys) {
            Ok(keys) => keys,
            Err(e) => {
                close_connection(sender).await;
                return ClientReport {
                    exit: ClientExit::Failed(e),
                    bytes_sent: 0,
                    bytes_received: 0,
                };
            }
        };

        let cancel = cancel.child_token();
        let _stop_directions = cancel.clone().drop_guard();

        let mut input = tokio::spawn(input_direction(keys, sender, self.exit_key, cancel.clone()));
        let mut output = tokio::spawn(display_direction(
            receiver,
            display,
            self.display_interprets_backspace,
            cancel.clone(),
        ));

        let (input_result, output_result, input_first) = tokio::select! {
            result = &mut input => {
                cancel.cancel();
                (result, output.await, true)
            }
            result = &mut output => {
                cancel.cancel();
                (input.await, result, false)
            }
        };

        let (input_exit, bytes_sent) = match input_result {
            Ok((exit, bytes, sender)) => {
                close_connection(sender).await;
                (exit, bytes)
            }
            Err(e) => (ClientExit::Failed(RemoteUartError::Terminal(e.to_string())), 0),
        };
        let (output_exit, bytes_received) = match output_result {
            Ok(result) => result,
            Err(e) => (ClientExit::Failed(RemoteUartError::Terminal(e.to_string())), 0),
        };

        let exit = if input_first { input_exit } else { output_exit };
        ClientReport {
            exit,
            bytes_sent,
            bytes_received,
        }
    }
}

/// Close without waiting on an unresponsive server past [`CLOSE_TIMEOUT`].
async fn close_connection(mut sender: Box<dyn FrameSender>) {
    match tokio::time::timeout(CLOSE_TIMEOUT, sender.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Client connection close: {}", e),
        Err(_) => debug!("Client connection close timed out"),
    }
}

type KeyEvent = RemoteUartResult<Option<u8>>;

/// Read keys on a dedicated thread. Terminal reads cannot be interrupted, so
/// the thread is detached and exits after its next key once nobody listens.
fn spawn_key_reader<K: KeySource + 'static>(mut keys: K) -> RemoteUartResult<mpsc::Receiver<KeyEvent>> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::Builder::new()
        .name("remote-uart-keys".to_string())
        .spawn(move || loop {
            let event = keys.read_key();
            let last = !matches!(event, Ok(Some(_)));
            if tx.blocking_send(event).is_err() || last {
                break;
            }
        })
        .map_err(|e| RemoteUartError::Terminal(format!("Failed to start keyboard reader: {}", e)))?;
    Ok(rx)
}

async fn input_direction(
    mut keys: mpsc::Receiver<KeyEvent>,
    mut sender: Box<dyn FrameSender>,
    exit_key: Option<u8>,
    cancel: CancellationToken,
) -> (ClientExit, u64, Box<dyn FrameSender>) {
    let mut sent = 0u64;

    let exit = loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break ClientExit::Cancelled,
            event = keys.recv() => event,
        };

        let key = match event {
            Some(Ok(Some(key))) => key,
            Some(Ok(None)) | None => break ClientExit::InputEnded,
            Some(Err(e)) => break ClientExit::Failed(e),
        };
        if Some(key) == exit_key {
            break ClientExit::ExitKey;
        }

        match sender.send(vec![translate_keystroke(key)]).await {
            Ok(()) => sent += 1,
            Err(RemoteUartError::ConnectionClosed) => break ClientExit::ConnectionClosed,
            Err(e) => break ClientExit::Failed(e),
        }
    };

    debug!("Client input direction ended: {}", exit);
    (exit, sent, sender)
}

async fn display_direction<W>(
    mut receiver: Box<dyn FrameReceiver>,
    mut display: W,
    display_interprets_backspace: bool,
    cancel: CancellationToken,
) -> (ClientExit, u64)
where
    W: AsyncWrite + Unpin + Send,
{
    let mut received = 0u64;

    let exit = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break ClientExit::Cancelled,
            next = receiver.recv() => next,
        };

        let data = match next {
            Some(Ok(data)) => data,
            Some(Err(e)) => break ClientExit::Failed(e),
            None => break ClientExit::ConnectionClosed,
        };
        received += data.len() as u64;

        let rendered = render_incoming(&data, display_interprets_backspace);
        if let Err(e) = display.write_all(&rendered).await {
            break ClientExit::Failed(RemoteUartError::Output(e.to_string()));
        }
        if let Err(e) = display.flush().await {
            break ClientExit::Failed(RemoteUartError::Output(e.to_string()));
        }
    };

    if let ClientExit::Failed(e) = &exit {
        warn!("Client display direction failed: {}", e);
    }
    (exit, received)
}
