//! In-process transport.
//!
//! [`memory_pair`] yields a [`Connection`] plus the [`MemoryPeer`] driving
//! its other end, which lets bridge sessions and the terminal client run
//! without sockets.

use crate::domain::error::{RemoteUartError, RemoteUartResult};
use crate::infrastructure::transport::{Connection, FrameReceiver, FrameSender};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// A frame as seen by either end of a memory connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryFrame {
    Data(Vec<u8>),
    Diagnostic(String),
    Close,
}

struct MemorySender {
    tx: mpsc::UnboundedSender<MemoryFrame>,
    closed: bool,
}

struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<MemoryFrame>,
    finished: bool,
}

#[async_trait]
impl FrameSender for MemorySender {
    async fn send(&mut self, data: Vec<u8>) -> RemoteUartResult<()> {
        if self.closed {
            return Err(RemoteUartError::ConnectionClosed);
        }
        self.tx
            .send(MemoryFrame::Data(data))
            .map_err(|_| RemoteUartError::ConnectionClosed)
    }

    async fn send_diagnostic(&mut self, text: &str) -> RemoteUartResult<()> {
        if self.closed {
            return Err(RemoteUartError::ConnectionClosed);
        }
        self.tx
            .send(MemoryFrame::Diagnostic(text.to_string()))
            .map_err(|_| RemoteUartError::ConnectionClosed)
    }

    async fn close(&mut self) -> RemoteUartResult<()> {
        if !self.closed {
            self.closed = true;
            let _ = self.tx.send(MemoryFrame::Close);
        }
        Ok(())
    }
}

#[async_trait]
impl FrameReceiver for MemoryReceiver {
    async fn recv(&mut self) -> Option<RemoteUartResult<Vec<u8>>> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(MemoryFrame::Data(data)) => Some(Ok(data)),
            Some(MemoryFrame::Diagnostic(text)) => Some(Ok(text.into_bytes())),
            Some(MemoryFrame::Close) | None => {
                self.finished = true;
                None
            }
        }
    }
}

/// The test-facing end of a memory connection.
pub struct MemoryPeer {
    tx: mpsc::UnboundedSender<MemoryFrame>,
    rx: mpsc::UnboundedReceiver<MemoryFrame>,
}

impl MemoryPeer {
    /// Send bytes to the connection. Returns `false` once the connection side
    /// has been dropped.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> bool {
        self.tx.send(MemoryFrame::Data(data.into())).is_ok()
    }

    /// Signal a normal close to the connection side.
    pub fn close(&self) {
        let _ = self.tx.send(MemoryFrame::Close);
    }

    /// Next frame sent by the connection side, or `None` once it is gone.
    pub async fn recv(&mut self) -> Option<MemoryFrame> {
        self.rx.recv().await
    }

    /// Like [`MemoryPeer::recv`] but gives up after `limit`.
    pub async fn recv_timeout(&mut self, limit: Duration) -> Option<MemoryFrame> {
        tokio::time::timeout(limit, self.rx.recv()).await.ok().flatten()
    }

    /// Collect data frames until at least `len` bytes arrived or `limit` passes.
    pub async fn collect_data(&mut self, len: usize, limit: Duration) -> Vec<u8> {
        let mut collected = Vec::new();
        let deadline = tokio::time::Instant::now() + limit;
        while collected.len() < len {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(MemoryFrame::Data(data))) => collected.extend(data),
                Ok(Some(_)) | Ok(None) | Err(_) => break,
            }
        }
        collected
    }
}

/// Create a connected in-memory pair.
pub fn memory_pair() -> (Connection, MemoryPeer) {
    let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
    let (from_peer_tx, from_peer_rx) = mpsc::unbounded_channel();

    let connection = Connection::new(
        Box::new(MemorySender {
            tx: to_peer_tx,
            closed: false,
        }),
        Box::new(MemoryReceiver {
            rx: from_peer_rx,
            finished: false,
        }),
        None,
    );
    let peer = MemoryPeer {
        tx: from_peer_tx,
        rx: to_peer_rx,
    };
    (connection, peer)
}

/// A sender whose peer never drains: every call hangs forever.
#[cfg(test)]
pub(crate) struct StalledSender;

#[cfg(test)]
#[async_trait]
impl FrameSender for StalledSender {
    async fn send(&mut self, _data: Vec<u8>) -> RemoteUartResult<()> {
        std::future::pending().await
    }

    async fn send_diagnostic(&mut self, _text: &str) -> RemoteUartResult<()> {
        std::future::pending().await
    }

    async fn close(&mut self) -> RemoteUartResult<()> {
        std::future::pending().await
    }
}
