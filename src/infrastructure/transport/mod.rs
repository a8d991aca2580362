// Transport module - Duplex network connections carrying raw byte frames
pub mod memory;
pub mod websocket;

use crate::domain::error::RemoteUartResult;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;

pub use memory::{memory_pair, MemoryFrame, MemoryPeer};

/// Upper bound on waiting for a peer to take a diagnostic or acknowledge a close.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Sending half of a duplex connection.
#[async_trait]
pub trait FrameSender: Send {
    /// Send one chunk of raw bytes as a single frame.
    async fn send(&mut self, data: Vec<u8>) -> RemoteUartResult<()>;

    /// Send a human-readable line to the peer.
    async fn send_diagnostic(&mut self, text: &str) -> RemoteUartResult<()>;

    /// Close the connection. Calling it again is a no-op.
    async fn close(&mut self) -> RemoteUartResult<()>;
}

/// Receiving half of a duplex connection.
#[async_trait]
pub trait FrameReceiver: Send {
    /// Wait for the next chunk of bytes. `None` once the peer has closed.
    ///
    /// Must be cancel-safe: dropping the future loses no data.
    async fn recv(&mut self) -> Option<RemoteUartResult<Vec<u8>>>;
}

/// An accepted or established duplex connection, already split.
pub struct Connection {
    pub sender: Box<dyn FrameSender>,
    pub receiver: Box<dyn FrameReceiver>,
    pub peer: Option<SocketAddr>,
}

impl Connection {
    pub fn new(
        sender: Box<dyn FrameSender>,
        receiver: Box<dyn FrameReceiver>,
        peer: Option<SocketAddr>,
    ) -> Self {
        Self {
            sender,
            receiver,
            peer,
        }
    }

    /// Human-readable peer name for log lines.
    pub fn peer_label(&self) -> String {
        self.peer
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "local".to_string())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish_non_exhaustive()
    }
}
