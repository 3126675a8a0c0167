//! The WebSocket transport gateway.
//!
//! This layer is deliberately thin: it authenticates the handshake hints,
//! registers the socket with the coordinator, and then pumps JSON frames in
//! both directions. All game semantics live behind the
//! [`CoordinatorHandle`]; a socket task never touches game state.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::ClientMessage;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::game::actor::CoordinatorHandle;

/// Handshake attributes carried as query parameters on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct AuthParams {
    pub pid: Option<String>,
    pub name: Option<String>,
}

/// The one-route transport surface plus a liveness probe.
pub fn router(handle: CoordinatorHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(handle)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<AuthParams>,
    State(handle): State<CoordinatorHandle>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_session(socket, params, handle))
}

/// Drive one socket for its whole life.
async fn client_session(mut socket: WebSocket, params: AuthParams, handle: CoordinatorHandle) {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();

    let client = match handle.connect(params.pid, params.name, out_tx).await {
        Ok(client) => client,
        Err(err) => {
            // Blacklisted (or the server is going down): the client just
            // sees a connection that never comes up.
            debug!(?err, "connection refused");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    // Writer half: everything the coordinator queues for this client, in
    // emission order. Ends when the coordinator drops the sender (e.g. a
    // kick or a newer socket for the same PID).
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let Ok(json) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader half: inbound frames become coordinator commands.
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => handle.client_message(client.pid.clone(), message),
                Err(err) => {
                    warn!(pid = %client.pid, %err, "dropping malformed frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // ping/pong/binary: nothing to do
            Err(_) => break,
        }
    }

    handle.disconnect(client.pid.clone(), client.conn_id);
    writer.abort();
}
