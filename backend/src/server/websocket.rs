//! WebSocket handler for real-time index updates

use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot so no change falls in between
    let mut events = state.downloads.subscribe();
    let snapshot = state.downloads.index().list().await;

    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        let msg = serde_json::json!({ "type": "snapshot", "entries": snapshot }).to_string();
        if sender.send(Message::Text(msg.into())).await.is_err() {
            return;
        }

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagged, {} updates skipped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let msg = serde_json::to_string(&event).unwrap_or_default();
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Only close frames matter from the client side
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => {
                info!("WebSocket client disconnected");
                break;
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Cancel the send task when client disconnects
    send_task.abort();
}
