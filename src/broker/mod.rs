//! The `broker` module manages the one connection to the external message
//! broker.
//!
//! - `manager`: the connection state machine, session pump and persistence worker.
//! - `reconnect`: retry timing after an unexpected disconnect.
//! - `normalize`: turns wire payloads into JSON documents.
//! - `details`, `state`, `message`: the values passed around between them.

pub mod details;
pub mod manager;
pub mod message;
pub mod normalize;
pub mod reconnect;
pub mod state;

pub use details::{ConnectionDetails, Secret};
pub use manager::{ConnectAck, ConnectionManager, ManagerOptions};
pub use message::InboundMessage;
pub use state::{ConnectionState, Status};
