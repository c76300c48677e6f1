//! The `transport` module is the boundary to the wire-protocol client
//! library that talks to the broker.
//!
//! The connection manager only sees the [`Transport`] and [`Session`]
//! traits: open a TLS session with the caller's credentials, subscribe to a
//! queue, then pull [`TransportEvent`]s until the link goes away. The AMQP
//! 1.0 implementation lives in [`amqp`] behind the `amqp` feature.

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod event;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;

use crate::broker::ConnectionDetails;
use crate::utils::error::ConnectError;

pub use event::{Payload, TransportEvent};

/// Opens broker sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the TLS + protocol handshake. Credentials in `details` must
    /// not be retained past this call.
    async fn open(&self, details: &ConnectionDetails) -> Result<Box<dyn Session>, ConnectError>;
}

/// One live broker session.
#[async_trait]
pub trait Session: Send {
    async fn subscribe(&mut self, queue: &str) -> Result<(), ConnectError>;

    /// Next event from the link, in wire order. `None` once the link is gone.
    ///
    /// Must be cancel-safe: the session pump races it against a shutdown
    /// signal.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    async fn close(&mut self);
}
