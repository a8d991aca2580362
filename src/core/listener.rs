//! Inbound side: accept connections, resolve them to a device, run sessions.
//!
//! Every accepted connection is dispatched on its own task, so the accept
//! loop never waits on a session. Dispatch goes through the registry before
//! the device is touched:
//!
//! 1. malformed parameters: protocol diagnostic, close, registry untouched
//! 2. device already held: busy diagnostic, close, device never opened
//! 3. open fails: lease released, diagnostic, close
//! 4. otherwise a [`BridgeSession`] runs until one direction ends

use crate::core::registry::DeviceRegistry;
use crate::core::session::{new_session_id, BridgeSession, SessionReport};
use crate::domain::config::ServerConfig;
use crate::domain::error::{RemoteUartError, RemoteUartResult};
use crate::domain::params::ConnectionParams;
use crate::infrastructure::serial::DeviceOpener;
use crate::infrastructure::transport::{websocket, Connection, CLOSE_TIMEOUT};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a dispatch needs, shared by all connections of one listener.
#[derive(Clone)]
pub struct BridgeContext {
    pub registry: Arc<DeviceRegistry>,
    pub opener: Arc<dyn DeviceOpener>,
    pub poll_delay: Duration,
    pub handshake_timeout: Duration,
    pub shutdown: CancellationToken,
}

impl BridgeContext {
    pub fn new(registry: Arc<DeviceRegistry>, opener: Arc<dyn DeviceOpener>, poll_delay: Duration) -> Self {
        Self {
            registry,
            opener,
            poll_delay,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }
}

/// Result of dispatching one inbound connection.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The connection was refused before a session started
    Rejected(RemoteUartError),
    /// A session ran to completion
    Completed(SessionReport),
}

impl DispatchOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, DispatchOutcome::Rejected(_))
    }
}

/// Resolve one inbound connection to a device and bridge it.
pub async fn dispatch(
    ctx: &BridgeContext,
    params: RemoteUartResult<ConnectionParams>,
    connection: Connection,
) -> DispatchOutcome {
    let peer = connection.peer_label();

    let params = match params {
        Ok(params) => params,
        Err(e) => return reject(connection, e).await,
    };

    let session_id = new_session_id();
    let lease = match ctx.registry.acquire(&params.device, &session_id, connection.peer) {
        Ok(lease) => lease,
        Err(e) => return reject(connection, e).await,
    };

    let opener = Arc::clone(&ctx.opener);
    let open_params = params.clone();
    let opened = tokio::task::spawn_blocking(move || opener.open(&open_params))
        .await
        .unwrap_or_else(|e| {
            Err(RemoteUartError::DeviceUnavailable {
                device: params.device.to_string(),
                reason: format!("open task failed: {}", e),
            })
        });

    let device = match opened {
        Ok(device) => device,
        Err(e) => {
            lease.release();
            return reject(connection, e).await;
        }
    };

    info!(
        "Opened '{}' at {} baud for {} (session '{}')",
        params.device, params.baud_rate, peer, session_id
    );

    let session = BridgeSession::new(
        params,
        connection,
        device,
        lease,
        ctx.poll_delay,
        ctx.shutdown.child_token(),
    );
    DispatchOutcome::Completed(session.run().await)
}

/// Tell the peer why it was refused and close the connection.
async fn reject(mut connection: Connection, error: RemoteUartError) -> DispatchOutcome {
    warn!("Rejecting connection from {}: {}", connection.peer_label(), error);

    let sender = &mut connection.sender;
    match tokio::time::timeout(CLOSE_TIMEOUT, sender.send_diagnostic(&error.to_string())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Failed to send diagnostic: {}", e),
        Err(_) => debug!("Sending diagnostic timed out"),
    }
    match tokio::time::timeout(CLOSE_TIMEOUT, sender.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Failed to close rejected connection: {}", e),
        Err(_) => debug!("Closing rejected connection timed out"),
    }
    DispatchOutcome::Rejected(error)
}

/// Accepts WebSocket connections and dispatches each on its own task.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: BridgeContext,
}

impl Listener {
    /// Bind the listening socket. Failure here is a startup error.
    pub async fn bind(
        config: &ServerConfig,
        registry: Arc<DeviceRegistry>,
        opener: Arc<dyn DeviceOpener>,
    ) -> RemoteUartResult<Self> {
        let bind_addr = config.listen_addr();
        let listener = TcpListener::bind(&bind_addr).await?;
        let local_addr = listener.local_addr()?;

        info!("Listening for remote UART clients on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            context: BridgeContext::new(registry, opener, config.poll_delay())
                .with_handshake_timeout(config.handshake_timeout()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` is cancelled, then wait for the
    /// running sessions to tear down.
    pub async fn run(self, shutdown: CancellationToken) -> RemoteUartResult<()> {
        let Listener {
            listener,
            local_addr,
            mut context,
        } = self;
        context.shutdown = shutdown.clone();

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Listener on {} shutting down", local_addr);
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted TCP connection from {}", peer);
                        let context = context.clone();
                        connections.spawn(async move {
                            handle_connection(context, stream, peer).await;
                        });
                    }
                    Err(e) => {
                        // Transient (e.g. out of file descriptors); keep accepting.
                        error!("Accept error: {}", e);
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        drop(listener);
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                error!("Connection task failed: {}", e);
            }
        }
        Ok(())
    }
}

async fn handle_connection(context: BridgeContext, stream: TcpStream, peer: SocketAddr) {
    let (connection, target) = tokio::select! {
        _ = context.shutdown.cancelled() => return,
        accepted = tokio::time::timeout(context.handshake_timeout, websocket::accept(stream, peer)) => match accepted {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(e)) => {
                warn!("WebSocket handshake with {} failed: {}", peer, e);
                return;
            }
            Err(_) => {
                warn!(
                    "WebSocket handshake with {} timed out after {:?}",
                    peer, context.handshake_timeout
                );
                return;
            }
        },
    };

    debug!("Connection from {} requested '{}'", peer, target);
    let params = ConnectionParams::from_request_target(&target);

    match dispatch(&context, params, connection).await {
        DispatchOutcome::Rejected(e) => debug!("Connection from {} rejected: {}", peer, e),
        DispatchOutcome::Completed(report) => debug!(
            "Connection from {} finished session '{}' ({})",
            peer, report.session_id, report.exit
        ),
    }
}
