use serde::{Deserialize, Serialize};

use crate::broker::{ConnectionDetails, ConnectionState};
use crate::persistence::StoredMessage;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// `{"type":"connect","host":..,"port":..,"username":..,"password":..,"queueName":..}`
    Connect(ConnectionDetails),
    Disconnect,
    Status,
    ListMessages { limit: Option<usize> },
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ControlResponse {
    Connected {
        message: String,
    },
    Disconnected {
        message: String,
    },
    Status {
        state: ConnectionState,
        is_connected: bool,
        auto_reconnect: bool,
        reconnect_armed: bool,
    },
    Messages {
        messages: Vec<StoredMessage>,
    },
    StateChanged {
        state: ConnectionState,
    },
    Error {
        message: String,
    },
}

impl ControlResponse {
    pub fn error(message: impl Into<String>) -> Self {
        ControlResponse::Error {
            message: message.into(),
        }
    }
}
