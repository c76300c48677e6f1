use serde_json::Value;

/// A message body as the transport library delivered it.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Binary body that declares itself as UTF-8 encoded content.
    Utf8Content(Vec<u8>),
    Binary(Vec<u8>),
    Text(String),
    /// Any other structured body (maps, lists, numbers...).
    Structured(Value),
    Empty,
}

impl Payload {
    /// Empty bodies carry nothing worth storing and are skipped.
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Utf8Content(bytes) | Payload::Binary(bytes) => bytes.is_empty(),
            Payload::Text(text) => text.is_empty(),
            Payload::Structured(value) => value.is_null(),
            Payload::Empty => true,
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

/// Events a live session yields, strictly ordered.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(Payload),
    /// Session-level error; the session is unusable afterwards.
    Error(String),
    Disconnected,
}
