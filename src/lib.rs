//! Remote UART Library
//!
//! Exposes local serial devices to remote terminals over WebSocket: a
//! listener that bridges each accepted connection to one device, a registry
//! enforcing a single client per device, and the matching terminal client.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::client::{ClientExit, ClientReport, TerminalClient};
pub use crate::core::listener::{dispatch, BridgeContext, DispatchOutcome, Listener};
pub use crate::core::registry::{DeviceLease, DeviceRegistry, RegistryEntry};
pub use crate::core::session::{BridgeSession, Direction, DirectionExit, SessionId, SessionReport, SessionState};
pub use crate::domain::config::RemoteUartConfig;
pub use crate::domain::error::{RemoteUartError, RemoteUartResult};
pub use crate::domain::params::{ConnectionParams, DeviceId};
