//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};

use crate::{infrastructure::websocket, ui::state::AppState, usecase::ClientSession};

/// Upgrade the request and hand the socket to a new session.
///
/// Any origin is accepted. Handshake failures are answered by axum before
/// this handler runs and never reach the coordinator.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (connection, inbound) = websocket::split(socket);
    let session = ClientSession::new(connection, inbound, state.coordinator.clone());
    let session_id = session.id();

    tracing::info!(session = %session_id, "WebSocket connection accepted");
    let reason = session.run().await;
    tracing::info!(session = %session_id, ?reason, "WebSocket session ended");
}
