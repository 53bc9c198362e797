//! WebSocket endpoints: the lobby channel for room-list watchers and the
//! room channel for participants. Each socket owns an mpsc receiver; the
//! coordinator writes to the sender half and never touches the socket.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::application::messages::{ClientMessage, ServerMessage};
use crate::infrastructure::app_state::AppState;

pub async fn lobby_ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_lobby_socket(state, socket))
}

/// Lobby clients only receive; inbound frames are read and dropped so the
/// connection stays alive.
async fn handle_lobby_socket(state: Arc<AppState>, socket: WebSocket) {
    let watcher_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.coordinator.register_watcher(&watcher_id, tx);

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if send_json(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.coordinator.unregister_watcher(&watcher_id);
    tracing::debug!(%watcher_id, "lobby socket closed");
}

#[derive(Debug, Deserialize)]
pub struct RoomWsParams {
    pub player_id: String,
}

pub async fn room_ws_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(params): Query<RoomWsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_room_socket(state, socket, room_id, params.player_id))
}

async fn handle_room_socket(
    state: Arc<AppState>,
    mut socket: WebSocket,
    room_id: String,
    player_id: String,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cleanup_handle = tx.clone();
    if let Err(err) = state.coordinator.join_room(&room_id, &player_id, tx) {
        tracing::info!(%room_id, %player_id, %err, "room join rejected");
        let rejection = ServerMessage::Error {
            message: err.to_string(),
        };
        let text = serde_json::to_string(&rejection).unwrap_or_default();
        let _ = socket.send(Message::Text(text)).await;
        let _ = socket.close().await;
        return;
    }

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if send_json(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => {
                                state.coordinator.handle_message(&room_id, &player_id, message);
                            }
                            Err(err) => {
                                // unknown or malformed frames are ignored
                                tracing::debug!(%room_id, %player_id, %err, "dropped frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.coordinator.disconnect(&player_id, &cleanup_handle);
    tracing::debug!(%room_id, %player_id, "room socket closed");
}

async fn send_json(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_default();
    sink.send(Message::Text(text)).await
}
