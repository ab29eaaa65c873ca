use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use crate::relay::event_relay::EventRelay;
use crate::relay::events::{ClientEvent, RelayEvent, SessionId};

use super::app_state::AppState;

pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let relay = state.relay.clone();
    ws.on_upgrade(move |socket| handle_ws_connection(socket, relay))
}

async fn handle_ws_connection(socket: WebSocket, relay: Arc<EventRelay>) {
    // A session starts anonymous; identity arrives via join-user-room.
    let (session_id, mut event_rx) = relay.connect();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Write loop: relay events -> WebSocket frames
    let write_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to serialize event");
                }
            }
        }
    });

    // Read loop: WebSocket frames -> relay events
    while let Some(msg_result) = ws_receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "WebSocket read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                handle_client_frame(&relay, session_id, &text).await;
            }
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping, pong (axum handles ping/pong)
        }
    }

    // Disconnect is the only teardown path: guaranteed room cleanup.
    relay.disconnect(session_id);
    write_handle.abort();
    info!(%session_id, "WebSocket connection closed");
}

async fn handle_client_frame(relay: &EventRelay, session_id: SessionId, text: &str) {
    // Parse into the closed event union before anything touches the relay.
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(ev) => ev,
        Err(e) => {
            warn!(%session_id, error = %e, "rejected malformed client event");
            relay.send_to_session(
                session_id,
                RelayEvent::Error {
                    message: "Invalid event payload".into(),
                },
            );
            return;
        }
    };

    if let Err(e) = relay.handle_event(session_id, event).await {
        warn!(%session_id, error = %e, "event failed");
        relay.send_to_session(
            session_id,
            RelayEvent::Error {
                message: e.to_string(),
            },
        );
    }
}
