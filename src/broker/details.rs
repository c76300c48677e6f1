use std::fmt;

use serde::Deserialize;

use crate::utils::error::ConnectError;

/// Credential material. Never printed, never serialized.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where and as whom to connect, and which queue to consume.
///
/// A value is handed to each connection attempt; the reconnect scheduler
/// keeps a clone of the last one so it can retry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    pub queue_name: String,
}

impl ConnectionDetails {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<Secret>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            queue_name: queue_name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.host.trim().is_empty() {
            return Err(ConnectError::InvalidDetails("host is empty".into()));
        }
        if self.port == 0 {
            return Err(ConnectError::InvalidDetails("port must be non-zero".into()));
        }
        if self.username.is_empty() {
            return Err(ConnectError::InvalidDetails("username is empty".into()));
        }
        if self.queue_name.trim().is_empty() {
            return Err(ConnectError::InvalidDetails("queue name is empty".into()));
        }
        Ok(())
    }
}
