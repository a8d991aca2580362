use thiserror::Error;

/// Remote UART unified error type
#[derive(Error, Debug)]
pub enum RemoteUartError {
    #[error("Device '{device}' unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("Device '{device}' is busy: another client is already connected")]
    DeviceBusy { device: String },

    #[error("Device I/O error: {0}")]
    DeviceIo(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl RemoteUartError {
    /// Whether the error ended a session because the network side went away,
    /// as opposed to a device fault.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, RemoteUartError::ConnectionClosed)
    }
}

pub type RemoteUartResult<T> = Result<T, RemoteUartError>;
