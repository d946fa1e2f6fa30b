//! Realtime sound/emoji relay over WebSocket.
//!
//! Clients join named rooms and trigger `sound` and `emoji` events that are
//! fanned out to every other member of the rooms they share. Nothing is
//! persisted and nothing is replayed.

pub mod events;
pub mod heartbeat;
pub mod rooms;

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;
use events::ClientEvent;
use heartbeat::{HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT};
pub use rooms::Relay;

type WsSink = SplitSink<WebSocket, Message>;

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json(sink: &mut WsSink, value: &serde_json::Value) -> bool {
    sink.send(Message::Text(value.to_string().into())).await.is_ok()
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let relay = state.relay.clone();
    let session_id = crate::snowflake::generate();

    // Subscribe before announcing the session so nothing addressed to it is missed.
    let mut broadcast_rx = relay.subscribe();

    let hello = serde_json::json!({
        "type": "hello",
        "data": {
            "session_id": session_id,
            "heartbeat_interval": HEARTBEAT_INTERVAL.as_millis() as u64
        }
    });
    if !send_json(&mut ws_sink, &hello).await {
        return;
    }
    tracing::debug!("relay session {session_id} connected");

    let mut joined: HashSet<String> = HashSet::new();
    let mut last_heartbeat = tokio::time::Instant::now();
    let mut heartbeat_interval = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            broadcast = broadcast_rx.recv() => {
                match broadcast {
                    Ok(broadcast) => {
                        if broadcast.recipients.contains(&session_id)
                            && !send_json(&mut ws_sink, &broadcast.event).await
                        {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("relay session {session_id} lagged, skipped {skipped} event(s)");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = heartbeat_interval.tick() => {
                if last_heartbeat.elapsed() > HEARTBEAT_TIMEOUT {
                    tracing::debug!("relay session {session_id} timed out");
                    break;
                }
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_heartbeat = tokio::time::Instant::now();
                        let event = match ClientEvent::parse(&text) {
                            Ok(event) => event,
                            Err(message) => {
                                tracing::warn!("relay session {session_id}: {message}");
                                if !send_json(&mut ws_sink, &events::error_event(&message)).await {
                                    break;
                                }
                                continue;
                            }
                        };
                        if !dispatch(&relay, &session_id, &mut joined, event, &mut ws_sink).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let message = "binary frames are not supported";
                        tracing::warn!("relay session {session_id}: {message}");
                        if !send_json(&mut ws_sink, &events::error_event(message)).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("relay session {session_id} socket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    relay.leave_all(&session_id, &joined);
    tracing::debug!(
        "relay session {session_id} disconnected from {} room(s)",
        joined.len()
    );
}

/// Apply one client event. Returns `false` once the socket is gone.
async fn dispatch(
    relay: &Relay,
    session_id: &str,
    joined: &mut HashSet<String>,
    event: ClientEvent,
    ws_sink: &mut WsSink,
) -> bool {
    match event {
        ClientEvent::Join(room_id) => {
            relay.join(session_id, &room_id);
            joined.insert(room_id.clone());
            send_json(ws_sink, &serde_json::json!({ "type": "joined", "data": room_id })).await
        }
        ClientEvent::Leave(room_id) => {
            relay.leave(session_id, &room_id);
            joined.remove(&room_id);
            send_json(ws_sink, &serde_json::json!({ "type": "left", "data": room_id })).await
        }
        ClientEvent::Sound(uid) => {
            if joined.is_empty() {
                tracing::debug!("relay session {session_id} sent sound outside any room");
                return true;
            }
            relay.publish(session_id, joined.iter(), events::sound_event(&uid));
            true
        }
        ClientEvent::Emoji(emoji) => {
            if joined.is_empty() {
                tracing::debug!("relay session {session_id} sent emoji outside any room");
                return true;
            }
            relay.publish(session_id, joined.iter(), events::emoji_event(&emoji));
            true
        }
        ClientEvent::Heartbeat => {
            send_json(ws_sink, &serde_json::json!({ "type": "heartbeat_ack" })).await
        }
    }
}
