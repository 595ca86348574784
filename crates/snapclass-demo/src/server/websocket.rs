use crate::models::DemoEvent;
use crate::state::DemoAppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

/// WebSocket handler for real-time event streaming
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<DemoAppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: DemoAppState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing between them is lost
    let mut events = state.event_bus.subscribe();

    // Send initial snapshot
    let initial = [
        DemoEvent::ModelStatusChanged(state.classifier.status()),
        DemoEvent::HistoryChanged(state.history.list()),
    ];
    for event in &initial {
        if let Ok(msg) = serde_json::to_string(event) {
            if sender.send(Message::Text(msg)).await.is_err() {
                return;
            }
        }
    }

    // Event forwarding task
    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("WebSocket client lagged, skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match serde_json::to_string(&event) {
                Ok(msg) => {
                    if sender.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize event: {}", e);
                }
            }
        }
    });

    // Receive task (handle client messages/pings)
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Ping(data) => {
                    // Pong is handled automatically by axum
                    tracing::trace!("Received ping: {:?}", data);
                }
                Message::Text(text) => {
                    tracing::trace!("Ignoring client message: {}", text);
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!("Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!("Receive task completed");
            send_task.abort();
        }
    }
}
