//! The `server` module exposes the connection manager to callers over a
//! WebSocket control endpoint.
//!
//! Callers send JSON requests tagged by `type` (`connect`, `disconnect`,
//! `status`, `list_messages`) and get one JSON response per request. Every
//! connection state transition is also pushed to each control client as a
//! `state_changed` message.

pub mod message;
pub mod websocket;

pub use websocket::{handle_request, serve, start_control_server};
