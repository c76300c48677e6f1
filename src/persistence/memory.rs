use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{MessageStore, StoredMessage};
use crate::utils::error::StoreError;

/// Non-durable store kept in a vector, oldest first.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<StoredMessage>>,
    max_messages: Option<usize>,
}

impl MemoryStore {
    pub fn new(max_messages: Option<usize>) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            max_messages,
        }
    }

    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageStore for MemoryStore {
    fn append(
        &self,
        content: &Value,
        received_at: DateTime<Utc>,
    ) -> Result<StoredMessage, StoreError> {
        let stored = StoredMessage::new(content.clone(), received_at);
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        messages.push(stored.clone());

        if let Some(max) = self.max_messages {
            if messages.len() > max {
                let excess = messages.len() - max;
                messages.drain(..excess);
            }
        }
        Ok(stored)
    }

    fn list_recent(&self, limit: Option<usize>) -> Result<Vec<StoredMessage>, StoreError> {
        let messages = self
            .messages
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(messages
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}
