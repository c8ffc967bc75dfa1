//! WebSocket handler
//!
//! Upgrades a named client and runs its session: socket reader, socket writer
//! and broker delivery loop.

use crate::connection::Connection;
use crate::protocol::Outbound;
use crate::server::GatewayState;
use crate::session::{Session, SessionManager};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Longest name usable as an AMQP queue name
const MAX_NAME_LEN: usize = 255;

/// Queue name prefix reserved by the broker
const RESERVED_PREFIX: &str = "amq.";

/// Query parameters of the upgrade request
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub name: Option<String>,
}

impl ConnectParams {
    /// Get the client name if it can be used as a queue name and routing key
    pub fn client_name(self) -> Result<String, &'static str> {
        let name = self.name.unwrap_or_default();

        if name.trim().is_empty() {
            return Err("Missing client name");
        }
        if name.len() > MAX_NAME_LEN {
            return Err("Client name too long");
        }
        // Wildcards would bind the queue to other clients' messages
        if name.contains(['*', '#']) {
            return Err("Client name must not contain wildcards");
        }
        // The broker refuses these and closes the shared channel
        if name.starts_with(RESERVED_PREFIX) {
            return Err("Client name uses a reserved prefix");
        }

        Ok(name)
    }
}

/// WebSocket relay handler
pub async fn relay_handler(
    State(state): State<GatewayState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let name = match params.client_name() {
        Ok(name) => name,
        Err(reason) => {
            tracing::debug!(reason, "Rejected upgrade request");
            return (StatusCode::BAD_REQUEST, reason).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, name, socket))
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(state: GatewayState, name: String, socket: WebSocket) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let connection = Connection::new(name, tx);
    let manager = state.sessions().clone();

    tracing::info!(name = %connection.name(), id = %connection.id(), "WebSocket connection established");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Spawn task to send messages to WebSocket
    let name_send = connection.name().to_string();
    let mut send_task = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            let message = match &out {
                Outbound::Frame(text) => Message::Text(text.clone()),
                Outbound::Close(code) => Message::Close(Some(CloseFrame {
                    code: code.as_u16(),
                    reason: code.description().into(),
                })),
            };

            if ws_sink.send(message).await.is_err() {
                tracing::warn!(name = %name_send, "Failed to send message to WebSocket");
                break;
            }
            if out.is_close() {
                break;
            }
        }

        let _ = ws_sink.close().await;
    });

    let session = match manager.open(connection.clone()) {
        Ok(session) => session,
        Err(e) => {
            tracing::info!(name = %connection.name(), error = %e, "Connection rejected");
            connection.close(e.to_close_code());
            let _ = send_task.await;
            return;
        }
    };

    // Spawn task to receive messages from WebSocket
    let mut recv_task = tokio::spawn({
        let manager = manager.clone();
        let session = session.clone();
        async move {
            while let Some(msg) = ws_stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        manager.forward(&session, &text).await;
                    }
                    Ok(Message::Binary(_)) => {
                        tracing::trace!(name = %session.name(), "Ignoring binary frame");
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {
                        // Pong is handled automatically by axum
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!(name = %session.name(), "Client closed connection");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(name = %session.name(), error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            // Tear down here as well, so a close during setup is seen by establish
            spawn_close(manager, session);
        }
    });

    let delivery_task = match manager.establish(&session).await {
        Ok(Some(deliveries)) => {
            let manager = manager.clone();
            let session = session.clone();
            Some(tokio::spawn(async move {
                manager.run_deliveries(session, deliveries).await;
            }))
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(name = %session.name(), error = %e, "Session setup failed");
            manager.close(&session).await;
            connection.close(e.to_close_code());
            None
        }
    };

    // Wait for either side of the socket to finish
    tokio::select! {
        _ = &mut recv_task => {
            tracing::debug!(name = %session.name(), "Receive task ended");
            send_task.abort();
        }
        _ = &mut send_task => {
            tracing::debug!(name = %session.name(), "Send task ended");
            recv_task.abort();
        }
    }

    // Clean up; waits for a teardown already started by the reader
    let _ = spawn_close(manager, session.clone()).await;

    // After a cancel the consumer drains and acks what it still holds
    if let Some(task) = delivery_task {
        if session.cancel_failed() {
            task.abort();
        } else {
            let _ = task.await;
        }
    }
}

/// Run a teardown on its own task so aborting the caller cannot cut it short
fn spawn_close(manager: Arc<SessionManager>, session: Arc<Session>) -> JoinHandle<()> {
    tokio::spawn(async move {
        manager.close(&session).await;
    })
}
