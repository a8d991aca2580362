// Session module - Bridge sessions between a network connection and a serial device
pub mod session;
pub mod state;

pub use session::{BridgeSession, DirectionExit, SessionReport, SharedDevice};
pub use state::{new_session_id, Direction, SessionId, SessionState};
