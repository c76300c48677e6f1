//! Persistence backed by `sled`.
//!
//! All messages live in a single `messages` tree. Keys are
//! `{received_at_millis:020}_{id:020}` where `id` comes from sled's
//! monotonic id generator, so a forward scan yields messages in the order
//! they were processed and a reverse scan yields the newest first.
//!
//! Configuration options supported:
//! - `ttl_seconds`: optional time-to-live for messages (older messages are
//!   removed during reads)
//! - `max_messages`: optional cap; when exceeded the oldest messages are
//!   removed on write.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sled::{Db, Tree};
use tracing::warn;

use super::{MessageStore, StoredMessage};
use crate::utils::error::StoreError;

const MESSAGES_TREE: &str = "messages";

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    messages: Tree,
    ttl_seconds: Option<i64>,
    max_messages: Option<usize>,
}

impl SledStore {
    /// Open or create a sled database at `path` with the given retention policy.
    pub fn open(
        path: &str,
        ttl_seconds: Option<i64>,
        max_messages: Option<usize>,
    ) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let messages = db.open_tree(MESSAGES_TREE)?;
        Ok(Self {
            db,
            messages,
            ttl_seconds,
            max_messages,
        })
    }

    fn key_for(&self, received_at: DateTime<Utc>) -> Result<String, StoreError> {
        let seq = self.db.generate_id()?;
        Ok(format!("{:020}_{:020}", received_at.timestamp_millis(), seq))
    }

    fn enforce_cap(&self) {
        let Some(max) = self.max_messages else {
            return;
        };
        let total_messages = self.messages.len();
        if total_messages <= max {
            return;
        }
        let excess = total_messages - max;

        let keys_to_delete: Vec<_> = self
            .messages
            .iter()
            .take(excess)
            .filter_map(|entry| entry.ok().map(|(k, _)| k))
            .collect();

        for key in keys_to_delete {
            if let Err(e) = self.messages.remove(key) {
                warn!(error = %e, "failed to trim old message");
            }
        }
    }

    /// Remove messages older than the TTL.
    fn cleanup_expired(&self) {
        let Some(ttl) = self.ttl_seconds else {
            return;
        };
        let expiry_time = Utc::now()
            .timestamp_millis()
            .saturating_sub(ttl.saturating_mul(1000));

        // keys sort by timestamp, so expired entries form a prefix
        let old_keys: Vec<_> = self
            .messages
            .iter()
            .filter_map(|res| res.ok())
            .map(|(key, _)| key)
            .take_while(|key| key_timestamp(key).is_some_and(|ts| ts < expiry_time))
            .collect();

        for key in old_keys {
            let _ = self.messages.remove(key);
        }
    }
}

fn key_timestamp(key: &[u8]) -> Option<i64> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (ts_str, _) = key_str.split_once('_')?;
    ts_str.parse::<i64>().ok()
}

impl MessageStore for SledStore {
    fn append(
        &self,
        content: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<StoredMessage, StoreError> {
        let stored = StoredMessage::new(content.clone(), received_at);
        let serialized = serde_json::to_vec(&stored)?;
        let key = self.key_for(received_at)?;

        self.messages.insert(key.as_bytes(), serialized)?;
        self.enforce_cap();
        Ok(stored)
    }

    fn list_recent(&self, limit: Option<usize>) -> Result<Vec<StoredMessage>, StoreError> {
        self.cleanup_expired();

        let mut out = Vec::new();
        for entry in self.messages.iter().rev() {
            if limit.is_some_and(|max| out.len() >= max) {
                break;
            }
            let (key, value) = entry?;
            match serde_json::from_slice::<StoredMessage>(&value) {
                Ok(msg) => out.push(msg),
                Err(e) => warn!(
                    key = %String::from_utf8_lossy(&key),
                    error = %e,
                    "skipping unreadable stored message"
                ),
            }
        }
        Ok(out)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("max_messages", &self.max_messages)
            .finish()
    }
}
