use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::auth::Actor;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, actor))
}

/// Streams the company's order notifications to one client.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, actor: Actor) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events_tx.subscribe();

    info!(user_id = %actor.user_id, "websocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let notification = match rx.recv().await {
                Ok(notification) => notification,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagging; notifications dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if notification.company_id != actor.company_id {
                continue;
            }

            let json = match serde_json::to_string(&notification) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize notification for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(user_id = %actor.user_id, "websocket client disconnected");
}
