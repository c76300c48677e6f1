use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the single broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Nothing attempted yet, or torn down on purpose.
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Handshake or session error, no retry scheduled.
    Failed,
    /// Failed, with a retry timer armed.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Snapshot returned by `ConnectionManager::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub state: ConnectionState,
    /// Automatic reconnection is enabled (cleared by an explicit disconnect).
    pub auto_reconnect: bool,
    /// A retry timer is currently pending.
    pub reconnect_armed: bool,
}

impl Status {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}
