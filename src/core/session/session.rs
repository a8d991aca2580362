use crate::core::registry::DeviceLease;
use crate::core::session::state::{Direction, SessionId, SessionState};
use crate::domain::error::{RemoteUartError, RemoteUartResult};
use crate::domain::params::{ConnectionParams, DeviceId};
use crate::infrastructure::serial::SerialDevice;
use crate::infrastructure::transport::{Connection, FrameReceiver, FrameSender, CLOSE_TIMEOUT};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Device handle shared by the two directions of one session.
pub type SharedDevice = Arc<Mutex<Box<dyn SerialDevice>>>;

/// How one forwarding direction ended.
#[derive(Debug)]
pub enum DirectionExit {
    /// Stopped because the counterpart ended or the server is shutting down
    Cancelled,
    /// The network peer closed the connection
    Closed,
    /// A device or network error
    Failed(RemoteUartError),
    /// The direction's task panicked
    Aborted(String),
}

impl DirectionExit {
    pub fn is_error(&self) -> bool {
        matches!(self, DirectionExit::Failed(_) | DirectionExit::Aborted(_))
    }
}

impl fmt::Display for DirectionExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectionExit::Cancelled => write!(f, "cancelled"),
            DirectionExit::Closed => write!(f, "connection closed"),
            DirectionExit::Failed(e) => write!(f, "{}", e),
            DirectionExit::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

struct DirectionOutcome {
    exit: DirectionExit,
    bytes: u64,
}

impl DirectionOutcome {
    fn aborted(error: JoinError) -> Self {
        Self {
            exit: DirectionExit::Aborted(error.to_string()),
            bytes: 0,
        }
    }
}

/// Summary of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub device: DeviceId,
    /// The direction that ended first and caused teardown
    pub ended_by: Direction,
    /// Why that direction ended
    pub exit: DirectionExit,
    pub bytes_to_device: u64,
    pub bytes_to_network: u64,
}

/// Resources released by teardown, plus the guard making it run once.
struct SessionResources {
    id: SessionId,
    device: SharedDevice,
    lease: Option<DeviceLease>,
    state: SessionState,
    cancel: CancellationToken,
    torn_down: bool,
}

impl SessionResources {
    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            return;
        }
        debug!("Session '{}' {} -> {}", self.id, self.state, next);
        self.state = next;
        if let Some(lease) = &self.lease {
            lease.set_state(next);
        }
    }

    async fn teardown(&mut self, sender: Option<Box<dyn FrameSender>>) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.transition(SessionState::Closing);
        self.cancel.cancel();

        if let Err(e) = with_device(&self.device, |device| {
            device.close();
            Ok(())
        })
        .await
        {
            warn!("Session '{}' failed to close device: {}", self.id, e);
        }

        if let Some(mut sender) = sender {
            match tokio::time::timeout(CLOSE_TIMEOUT, sender.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Session '{}' connection close: {}", self.id, e),
                Err(_) => debug!("Session '{}' connection close timed out", self.id),
            }
        }

        if let Some(lease) = self.lease.take() {
            lease.release();
        }
        self.transition(SessionState::Closed);
    }
}

/// One network connection bridged to one serial device.
pub struct BridgeSession {
    params: ConnectionParams,
    connection: Connection,
    poll_delay: Duration,
    resources: SessionResources,
}

impl BridgeSession {
    /// Build a session over an opened device. The session takes ownership of
    /// the connection, the device and the registry lease.
    pub fn new(
        params: ConnectionParams,
        connection: Connection,
        device: Box<dyn SerialDevice>,
        lease: DeviceLease,
        poll_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            params,
            connection,
            poll_delay,
            resources: SessionResources {
                id: lease.session_id().clone(),
                device: Arc::new(Mutex::new(device)),
                lease: Some(lease),
                state: SessionState::Opening,
                cancel,
                torn_down: false,
            },
        }
    }

    pub fn state(&self) -> SessionState {
        self.resources.state
    }

    /// Run both forwarding directions until one ends, then tear down.
    pub async fn run(self) -> SessionReport {
        let BridgeSession {
            params,
            connection,
            poll_delay,
            mut resources,
        } = self;
        let Connection {
            sender,
            receiver,
            peer,
        } = connection;
        let peer = peer
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "local".to_string());

        resources.transition(SessionState::Active);
        info!(
            "Session '{}' active: {} <-> {} at {} baud",
            resources.id, peer, params.device, params.baud_rate
        );

        let cancel = resources.cancel.clone();
        // Dropping this future (e.g. on abort) must still stop both directions.
        let _stop_directions = cancel.clone().drop_guard();

        let mut to_network = tokio::spawn(device_to_network(
            resources.id.clone(),
            Arc::clone(&resources.device),
            sender,
            cancel.clone(),
            poll_delay,
        ));
        let mut to_device = tokio::spawn(network_to_device(
            resources.id.clone(),
            Arc::clone(&resources.device),
            receiver,
            cancel.clone(),
        ));

        let (ended_by, network_result, device_result) = tokio::select! {
            result = &mut to_network => {
                cancel.cancel();
                (Direction::DeviceToNetwork, result, to_device.await)
            }
            result = &mut to_device => {
                cancel.cancel();
                (Direction::NetworkToDevice, to_network.await, result)
            }
        };

        let (network_outcome, sender) = match network_result {
            Ok((outcome, sender)) => (outcome, Some(sender)),
            Err(e) => (DirectionOutcome::aborted(e), None),
        };
        let device_outcome = device_result.unwrap_or_else(DirectionOutcome::aborted);

        resources.teardown(sender).await;

        let (exit, other) = match ended_by {
            Direction::DeviceToNetwork => (network_outcome.exit, device_outcome.exit),
            Direction::NetworkToDevice => (device_outcome.exit, network_outcome.exit),
        };
        if other.is_error() {
            debug!("Session '{}' counterpart direction: {}", resources.id, other);
        }

        let report = SessionReport {
            session_id: resources.id.clone(),
            device: params.device,
            ended_by,
            exit,
            bytes_to_device: device_outcome.bytes,
            bytes_to_network: network_outcome.bytes,
        };

        if report.exit.is_error() {
            warn!(
                "Session '{}' on '{}' ended by {}: {}",
                report.session_id, report.device, report.ended_by, report.exit
            );
        }
        info!(
            "Session '{}' closed: {} bytes to device, {} bytes to network",
            report.session_id, report.bytes_to_device, report.bytes_to_network
        );

        report
    }
}

/// Run a device operation on the blocking pool.
async fn with_device<T, F>(device: &SharedDevice, op: F) -> RemoteUartResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Box<dyn SerialDevice>) -> RemoteUartResult<T> + Send + 'static,
{
    let device = Arc::clone(device);
    tokio::task::spawn_blocking(move || {
        let mut guard = device.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        op(&mut *guard)
    })
    .await
    .map_err(|e| RemoteUartError::DeviceIo(format!("device task failed: {}", e)))?
}

async fn device_to_network(
    session_id: SessionId,
    device: SharedDevice,
    mut sender: Box<dyn FrameSender>,
    cancel: CancellationToken,
    poll_delay: Duration,
) -> (DirectionOutcome, Box<dyn FrameSender>) {
    let mut forwarded = 0u64;

    let exit = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break DirectionExit::Cancelled,
            _ = tokio::time::sleep(poll_delay) => {}
        }

        let chunk = match with_device(&device, |device| device.read_available()).await {
            Ok(chunk) => chunk,
            Err(e) => break DirectionExit::Failed(e),
        };
        if chunk.is_empty() {
            continue;
        }

        trace!("Session '{}' device -> network: {}", session_id, hex::encode(&chunk));
        let len = chunk.len() as u64;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break DirectionExit::Cancelled,
            result = sender.send(chunk) => result,
        };
        match result {
            Ok(()) => forwarded += len,
            Err(RemoteUartError::ConnectionClosed) => break DirectionExit::Closed,
            Err(e) => break DirectionExit::Failed(e),
        }
    };

    debug!("Session '{}' {} ended: {}", session_id, Direction::DeviceToNetwork, exit);
    (
        DirectionOutcome {
            exit,
            bytes: forwarded,
        },
        sender,
    )
}

async fn network_to_device(
    session_id: SessionId,
    device: SharedDevice,
    mut receiver: Box<dyn FrameReceiver>,
    cancel: CancellationToken,
) -> DirectionOutcome {
    let mut written = 0u64;

    let exit = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break DirectionExit::Cancelled,
            next = receiver.recv() => next,
        };

        let data = match next {
            Some(Ok(data)) => data,
            Some(Err(e)) => break DirectionExit::Failed(e),
            None => break DirectionExit::Closed,
        };
        if data.is_empty() {
            continue;
        }

        trace!("Session '{}' network -> device: {}", session_id, hex::encode(&data));
        let len = data.len() as u64;
        if let Err(e) = with_device(&device, move |device| device.write(&data)).await {
            break DirectionExit::Failed(e);
        }
        written += len;
    };

    debug!("Session '{}' {} ended: {}", session_id, Direction::NetworkToDevice, exit);
    DirectionOutcome {
        exit,
        bytes: written,
    }
}
