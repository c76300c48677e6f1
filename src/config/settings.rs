use std::time::Duration;

use serde::Deserialize;

use crate::broker::reconnect::{Backoff, ReconnectPolicy};

/// Top-level configuration settings for the application.
///
/// Includes settings for the control server, the broker connection, the
/// persistence sink and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the control server.
///
/// Defines the host and port the WebSocket control endpoint will bind to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the broker connection.
///
/// Controls automatic reconnection and the optional handshake timeout.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub auto_reconnect: bool,
    pub reconnect_delay_secs: u64,
    pub backoff: Backoff,
    pub max_reconnect_delay_secs: u64,
    pub handshake_timeout_secs: Option<u64>,
}

impl BrokerSettings {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.auto_reconnect,
            delay: Duration::from_secs(self.reconnect_delay_secs),
            backoff: self.backoff,
            max_delay: Duration::from_secs(self.max_reconnect_delay_secs),
        }
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sled,
    Memory,
}

/// Configuration settings for the persistence sink and its work queue.
#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceSettings {
    pub backend: StoreBackend,
    pub path: String,
    pub ttl_secs: Option<i64>,
    pub max_messages: Option<usize>,
    pub queue_capacity: usize,
    pub enqueue_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub persistence: Option<PartialPersistenceSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub auto_reconnect: Option<bool>,
    pub reconnect_delay_secs: Option<u64>,
    pub backoff: Option<Backoff>,
    pub max_reconnect_delay_secs: Option<u64>,
    pub handshake_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPersistenceSettings {
    pub backend: Option<StoreBackend>,
    pub path: Option<String>,
    pub ttl_secs: Option<i64>,
    pub max_messages: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub enqueue_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// The reconnect defaults reproduce the observed broker behaviour: a fixed
/// five second delay, retried forever.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            broker: BrokerSettings {
                auto_reconnect: true,
                reconnect_delay_secs: 5,
                backoff: Backoff::Fixed,
                max_reconnect_delay_secs: 60,
                handshake_timeout_secs: None,
            },
            persistence: PersistenceSettings {
                backend: StoreBackend::Sled,
                path: "brokerlink_db".to_string(),
                ttl_secs: None,
                max_messages: None,
                queue_capacity: 1024,
                enqueue_timeout_ms: 1000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let server = self.server;
        let broker = self.broker;
        let persistence = self.persistence;
        let logging = self.logging;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                auto_reconnect: broker
                    .as_ref()
                    .and_then(|b| b.auto_reconnect)
                    .unwrap_or(default.broker.auto_reconnect),
                reconnect_delay_secs: broker
                    .as_ref()
                    .and_then(|b| b.reconnect_delay_secs)
                    .unwrap_or(default.broker.reconnect_delay_secs),
                backoff: broker
                    .as_ref()
                    .and_then(|b| b.backoff)
                    .unwrap_or(default.broker.backoff),
                max_reconnect_delay_secs: broker
                    .as_ref()
                    .and_then(|b| b.max_reconnect_delay_secs)
                    .unwrap_or(default.broker.max_reconnect_delay_secs),
                handshake_timeout_secs: broker
                    .as_ref()
                    .and_then(|b| b.handshake_timeout_secs)
                    .or(default.broker.handshake_timeout_secs),
            },
            persistence: PersistenceSettings {
                backend: persistence
                    .as_ref()
                    .and_then(|p| p.backend)
                    .unwrap_or(default.persistence.backend),
                path: persistence
                    .as_ref()
                    .and_then(|p| p.path.clone())
                    .unwrap_or(default.persistence.path),
                ttl_secs: persistence
                    .as_ref()
                    .and_then(|p| p.ttl_secs)
                    .or(default.persistence.ttl_secs),
                max_messages: persistence
                    .as_ref()
                    .and_then(|p| p.max_messages)
                    .or(default.persistence.max_messages),
                queue_capacity: persistence
                    .as_ref()
                    .and_then(|p| p.queue_capacity)
                    .unwrap_or(default.persistence.queue_capacity),
                enqueue_timeout_ms: persistence
                    .as_ref()
                    .and_then(|p| p.enqueue_timeout_ms)
                    .unwrap_or(default.persistence.enqueue_timeout_ms),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }
}
