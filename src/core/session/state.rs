use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one bridge session.
pub type SessionId = String;

/// Generate a new unique session identifier.
pub fn new_session_id() -> SessionId {
    format!("session_{}", uuid::Uuid::new_v4().simple())
}

/// Lifecycle of a bridge session. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Registry entry acquired, device not yet open
    Opening,
    /// Both forwarding directions running
    Active,
    /// Teardown in progress
    Closing,
    /// All resources released
    Closed,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::Opening => 0,
            SessionState::Active => 1,
            SessionState::Closing => 2,
            SessionState::Closed => 3,
        }
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Opening => write!(f, "Opening"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Which forwarding direction of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    DeviceToNetwork,
    NetworkToDevice,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::DeviceToNetwork => write!(f, "device->network"),
            Direction::NetworkToDevice => write!(f, "network->device"),
        }
    }
}
