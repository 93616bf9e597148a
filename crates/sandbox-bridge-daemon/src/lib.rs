//! sandbox-bridge daemon library
//!
//! Core functionality for the relay daemon:
//! - Session registry mapping client connections to backend units
//! - Subprocess management for backend units and their event streams
//! - Request relay turning backend events into client event messages
//! - WebSocket + health HTTP server

pub mod relay;
pub mod server;
pub mod session;
pub mod subprocess;
