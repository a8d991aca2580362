// Core module - Registry, bridge sessions, listener and terminal client
pub mod client;
pub mod listener;
pub mod registry;
pub mod session;
