//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point for an editor WebSocket connection. It parses
//! client frames into commands for the connection's `EditorTask` and forwards
//! the task's messages back over the socket.

use crate::web::{
    editor_task::EditorTask,
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!("New editor connection established for user: {}", user_id);

    let (mut sender, mut receiver) = socket.split();
    let (command_tx, command_rx) = mpsc::channel::<ClientMessage>(CHANNEL_CAPACITY);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(CHANNEL_CAPACITY);
    let token = CancellationToken::new();

    let editor = EditorTask::from_state(&app_state, user_id, outbound_tx.clone());
    let editor_handle = tokio::spawn(editor.run(command_rx, token.clone()));

    // Forwards everything the editor says to the socket until the editor is gone.
    let forward_token = token.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {:?}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                warn!("Failed to write to socket, stopping editor.");
                forward_token.cancel();
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(command) => {
                if command_tx.send(command).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to deserialize client message: {}", e);
                let reply = ServerMessage::Error {
                    message: format!("Invalid message: {}", e),
                };
                if outbound_tx.send(reply).await.is_err() {
                    break;
                }
            }
        }
    }

    // Closing the command channel lets the editor flush and finish on its own.
    drop(command_tx);
    drop(outbound_tx);
    if let Err(e) = editor_handle.await {
        error!("Editor task failed: {:?}", e);
    }
    forwarder.abort();
    info!("Editor connection closed for user: {}", user_id);
}
