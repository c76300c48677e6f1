//! The `persistence` module provides the sink that inbound broker messages
//! are written to, and the query used to read them back.
//!
//! Storage is append-only. Reads return the most recently received
//! messages first. Two backends are provided: `sled` as an embedded,
//! durable key-value store, and a plain in-memory vector.

pub mod memory;
pub mod sled_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::error::StoreError;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// A normalized message as recorded by a [`MessageStore`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub content: Value,
    pub received_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(content: Value, received_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            received_at,
        }
    }
}

/// Durable, append-only store for normalized messages.
///
/// Implementations are synchronous; the connection manager calls them from
/// the blocking thread pool, one append at a time.
pub trait MessageStore: Send + Sync {
    /// Record `content`, received at `received_at`.
    fn append(&self, content: &Value, received_at: DateTime<Utc>)
    -> Result<StoredMessage, StoreError>;

    /// Stored messages, most recently received first. `limit` caps the count.
    fn list_recent(&self, limit: Option<usize>) -> Result<Vec<StoredMessage>, StoreError>;

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
