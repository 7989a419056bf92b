use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::domain::OrderUpdate;

/// GET /api/orders/ws/:order_id - live status feed for one order
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(order_id): Path<String>,
    State(state): State<AppState>,
) -> std::result::Result<impl IntoResponse, StatusCode> {
    let order_id = Uuid::parse_str(&order_id).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, order_id, state)))
}

async fn handle_socket(socket: WebSocket, order_id: Uuid, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Register before greeting so no delta published after the greeting is missed
    let hub = state.runtime.hub().clone();
    let mut subscription = hub.subscribe(order_id);
    let observer = subscription.id();

    let send_task = tokio::spawn(async move {
        match OrderUpdate::connected(order_id).to_json() {
            Ok(json) => {
                if sender.send(Message::Text(json)).await.is_err() {
                    return;
                }
            }
            Err(e) => error!("Failed to serialize greeting: {}", e),
        }

        while let Some(update) = subscription.recv().await {
            let json = match update.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize order update: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }

        // Hub closed or client gone
        let _ = sender.close().await;
    });

    // Incoming frames are ignored; the feed is one-way
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    // Abort the send task when connection closes
    send_task.abort();
    hub.unsubscribe_id(order_id, observer);
    debug!(%order_id, observer, "Observer detached");

    info!(%order_id, "WebSocket connection closed");
}
