//! AMQP 1.0 transport over TLS, built on `fe2o3-amqp`.
//!
//! Data-section bodies are reported as [`Payload::Utf8Content`],
//! `amqp-value` strings and binaries as text and raw binary, and every other
//! `amqp-value` as a structured payload. Each delivery is accepted once it
//! has been handed to the session pump.

use async_trait::async_trait;
use fe2o3_amqp::connection::ConnectionHandle;
use fe2o3_amqp::session::SessionHandle;
use fe2o3_amqp::types::messaging::{AmqpValue, Body};
use fe2o3_amqp::types::primitives::Value as AmqpAny;
use fe2o3_amqp::{Connection, Receiver};
use tracing::{debug, warn};
use url::Url;

use super::{Payload, Session, Transport, TransportEvent};
use crate::broker::ConnectionDetails;
use crate::utils::error::ConnectError;

/// Opens `amqps://` sessions; credentials go out as SASL PLAIN.
#[derive(Debug, Default, Clone)]
pub struct AmqpTransport;

impl AmqpTransport {
    pub fn new() -> Self {
        Self
    }
}

fn broker_url(details: &ConnectionDetails) -> Result<Url, ConnectError> {
    let mut url = Url::parse(&format!("amqps://{}:{}", details.host, details.port))
        .map_err(|e| ConnectError::InvalidDetails(format!("bad broker address: {e}")))?;
    url.set_username(&details.username)
        .map_err(|_| ConnectError::InvalidDetails("username not accepted in URL".into()))?;
    url.set_password(Some(details.password.expose()))
        .map_err(|_| ConnectError::InvalidDetails("password not accepted in URL".into()))?;
    Ok(url)
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn open(&self, details: &ConnectionDetails) -> Result<Box<dyn Session>, ConnectError> {
        let url = broker_url(details)?;
        let container_id = format!("brokerlink-{}", uuid::Uuid::new_v4());

        let mut connection = Connection::open(container_id, url)
            .await
            .map_err(|e| ConnectError::Unreachable {
                host: details.host.clone(),
                port: details.port,
                reason: e.to_string(),
            })?;

        let session = match fe2o3_amqp::Session::begin(&mut connection).await {
            Ok(session) => session,
            Err(e) => {
                let _ = connection.close().await;
                return Err(ConnectError::Handshake(e.to_string()));
            }
        };

        Ok(Box::new(AmqpSession {
            connection,
            session,
            receiver: None,
        }))
    }
}

struct AmqpSession {
    connection: ConnectionHandle<()>,
    session: SessionHandle<()>,
    receiver: Option<Receiver>,
}

#[async_trait]
impl Session for AmqpSession {
    async fn subscribe(&mut self, queue: &str) -> Result<(), ConnectError> {
        let link_name = format!("brokerlink-receiver-{}", uuid::Uuid::new_v4());
        let receiver = Receiver::attach(&mut self.session, link_name, queue)
            .await
            .map_err(|e| ConnectError::Subscribe {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        self.receiver = Some(receiver);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        let receiver = self.receiver.as_mut()?;
        match receiver.recv::<Body<AmqpAny>>().await {
            Ok(delivery) => {
                let payload = payload_from_body(delivery.body());
                if let Err(e) = receiver.accept(&delivery).await {
                    warn!(error = %e, "failed to accept delivery");
                }
                Some(TransportEvent::Message(payload))
            }
            Err(e) => {
                debug!(error = %e, "receiver link closed");
                Some(TransportEvent::Disconnected)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.close().await;
        }
        let _ = self.session.end().await;
        let _ = self.connection.close().await;
    }
}

fn payload_from_body(body: &Body<AmqpAny>) -> Payload {
    match body {
        Body::Data(batch) => {
            let mut bytes = Vec::new();
            for section in batch.iter() {
                bytes.extend_from_slice(&section.0);
            }
            Payload::Utf8Content(bytes)
        }
        Body::Value(AmqpValue(AmqpAny::String(text))) => Payload::Text(text.clone()),
        Body::Value(AmqpValue(AmqpAny::Binary(bytes))) => Payload::Binary(bytes.to_vec()),
        Body::Value(AmqpValue(AmqpAny::Null)) | Body::Empty => Payload::Empty,
        Body::Value(AmqpValue(other)) => Payload::Structured(
            serde_json::to_value(other).unwrap_or_else(|_| format!("{other:?}").into()),
        ),
        other => Payload::Text(format!("{other:?}")),
    }
}
