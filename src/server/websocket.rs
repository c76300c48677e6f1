use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{ConnectAck, ConnectionManager};
use crate::server::message::{ControlRequest, ControlResponse};
use crate::utils::error::DisconnectError;

const CONNECTED: &str = "Connected & subscribed to queue successfully.";
const DISCONNECTED: &str = "Disconnected successfully.";
const NOT_CONNECTED: &str = "Not connected to broker.";

/// Bind `addr` and serve control clients until the listener fails.
pub async fn start_control_server(addr: String, manager: ConnectionManager) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("control server listening on ws://{addr}");
    serve(listener, manager).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, manager: ConnectionManager) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                spawn(handle_connection(stream, peer, manager.clone()));
            }
            Err(e) => {
                error!(error = %e, "control listener accept failed");
                break;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, manager: ConnectionManager) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "websocket handshake error");
            return;
        }
    };

    let client_id = format!("control-{}", uuid::Uuid::new_v4());
    info!(client = %client_id, %peer, "control client connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    // manager → client
    let client_id_clone = client_id.clone();
    let send_loop = spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_sender.send(msg).await {
                debug!(client = %client_id_clone, error = %e, "send to control client failed");
                break;
            }
        }
    });

    let mut states = manager.subscribe();
    let state_tx = tx.clone();
    let notifier = spawn(async move {
        loop {
            match states.recv().await {
                Ok(state) => {
                    if !send_response(&state_tx, &ControlResponse::StateChanged { state }) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "control client lagged behind state changes");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Requests are handled one at a time, so replies keep request order.
    while let Some(frame) = ws_receiver.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                debug!(client = %client_id, error = %e, "control socket read failed");
                break;
            }
        };
        if msg.is_close() {
            break;
        }
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };

        let response = match serde_json::from_str::<ControlRequest>(text) {
            Ok(request) => {
                debug!(client = %client_id, ?request, "control request");
                handle_request(&manager, request).await
            }
            Err(err) => {
                warn!(client = %client_id, error = %err, "invalid control message");
                ControlResponse::error(format!("Invalid request: {err}"))
            }
        };

        if !send_response(&tx, &response) {
            break;
        }
    }

    notifier.abort();
    drop(tx);
    let _ = send_loop.await;
    info!(client = %client_id, "control client disconnected");
}

/// Run one control request against the manager and build its reply.
pub async fn handle_request(manager: &ConnectionManager, request: ControlRequest) -> ControlResponse {
    match request {
        ControlRequest::Connect(details) => match manager.connect(details).await {
            Ok(ConnectAck::Connected) => ControlResponse::Connected {
                message: CONNECTED.to_string(),
            },
            Ok(ConnectAck::AlreadyActive(state)) => ControlResponse::Connected {
                message: format!("Already {state}."),
            },
            Err(e) => ControlResponse::error(e.to_string()),
        },
        ControlRequest::Disconnect => match manager.disconnect().await {
            Ok(()) => ControlResponse::Disconnected {
                message: DISCONNECTED.to_string(),
            },
            Err(DisconnectError::NotConnected) => ControlResponse::error(NOT_CONNECTED),
        },
        ControlRequest::Status => {
            let status = manager.status();
            ControlResponse::Status {
                state: status.state,
                is_connected: status.is_connected(),
                auto_reconnect: status.auto_reconnect,
                reconnect_armed: status.reconnect_armed,
            }
        }
        ControlRequest::ListMessages { limit } => match manager.list_messages(limit).await {
            Ok(messages) => ControlResponse::Messages { messages },
            Err(e) => {
                error!(error = %e, "listing stored messages failed");
                ControlResponse::error("Could not retrieve messages.")
            }
        },
    }
}

fn send_response(tx: &mpsc::UnboundedSender<WsMessage>, response: &ControlResponse) -> bool {
    match serde_json::to_string(response) {
        Ok(json) => tx.send(WsMessage::text(json)).is_ok(),
        Err(e) => {
            error!(error = %e, "failed to serialize control response");
            true
        }
    }
}
