use chrono::{DateTime, Utc};
use serde_json::Value;

use super::normalize::normalize;
use crate::transport::Payload;

/// A message taken off the broker link, normalized and stamped.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub raw: Payload,
    pub content: Value,
    /// Set when the message is normalized, not when it arrived on the wire,
    /// so stored order follows processing order.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn from_payload(raw: Payload) -> Self {
        let content = normalize(&raw);
        Self {
            raw,
            content,
            received_at: Utc::now(),
        }
    }
}
