//! Error types shared by the connection manager, the transport adapters and
//! the persistence layer.
//!
//! Message normalization has no error type on purpose: anything it cannot
//! interpret is stored as `{"rawMessage": ...}` instead.

use std::time::Duration;

use thiserror::Error;

/// Failure to bring a broker session up.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid connection details: {0}")]
    InvalidDetails(String),

    #[error("broker unreachable at {host}:{port}: {reason}")]
    Unreachable {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("failed to subscribe to queue '{queue}': {reason}")]
    Subscribe { queue: String, reason: String },

    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// A disconnect was requested while this attempt was in flight.
    #[error("connection attempt cancelled by disconnect")]
    Cancelled,

    #[error("connection manager has been shut down")]
    ShutDown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DisconnectError {
    #[error("not connected to broker")]
    NotConnected,
}

/// Failure of the persistence sink.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("failed to (de)serialize stored message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
