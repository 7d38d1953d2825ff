use crate::state::AdminState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tracing::debug;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 16;

pub fn router() -> Router<AdminState> {
	Router::new().route("/ws/analytics", get(upgrade))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AdminState>) -> Response {
	ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AdminState) {
	let active_rule_count = state.rule_cache.snapshot().await.len();
	let (id, mut rx) = state.broadcaster.subscribe(active_rule_count, SUBSCRIBER_CHANNEL_CAPACITY).await;
	let (mut sender, mut receiver) = socket.split();

	let forward = tokio::spawn(async move {
		while let Some(message) = rx.recv().await {
			let Ok(payload) = serde_json::to_string(&message) else {
				continue;
			};
			if sender.send(Message::Text(payload)).await.is_err() {
				break;
			}
		}
	});

	// No messages are expected from the client; drain the socket until it
	// closes so the connection's read half doesn't pile up unread frames.
	while let Some(message) = receiver.next().await {
		if message.is_err() {
			break;
		}
	}

	forward.abort();
	state.broadcaster.unsubscribe(id);
	debug!(connection_id = id, "analytics websocket disconnected");
}
