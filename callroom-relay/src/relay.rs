//! WebSocket handler: connection lifecycle and inbound frame routing.
//!
//! Each upgraded socket is registered with the [`RoomHub`] for as long as the
//! handler runs. Inbound frames are decoded only far enough to find the room
//! they address; a `voice-data` frame is then fanned out to the other room
//! members exactly as it was received. Malformed frames are logged and
//! dropped, and nothing is ever sent back to the sender.

use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use callroom_proto::codec;
use callroom_proto::event::{BinaryFrame, ClientEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::hub::{Connection, RoomHub};
use crate::server::SharedState;

/// The hub type used by the WebSocket server.
pub type SocketHub = RoomHub<Message>;

/// axum handler that upgrades an HTTP request to a relay WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let hub = Arc::clone(&state.hub);
    let outbound_queue = state.outbound_queue;
    ws.max_message_size(state.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, hub, outbound_queue))
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Register with the hub (no room state yet).
/// 2. Spawn a writer task draining the outbound queue (`outbound_queue`
///    frames deep) to the socket.
/// 3. Read and route inbound frames until close or transport error.
/// 4. Drop the hub handle, which removes the client from every room.
pub async fn handle_socket(socket: WebSocket, hub: Arc<SocketHub>, outbound_queue: usize) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(outbound_queue.max(1));
    let connection = hub.connect(tx);
    let connection_id = connection.id();

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(connection_id = %connection_id, "WebSocket write failed");
                break;
            }
        }
    });

    let read_loop = async {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_frame(&connection, msg) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::info!(connection_id = %connection_id, error = %e, "WebSocket read failed");
                    break;
                }
            }
        }
    };

    // Whichever side finishes first ends the connection.
    tokio::select! {
        () = read_loop => {
            write_task.abort();
        }
        _ = &mut write_task => {}
    }

    drop(connection);
}

/// Routes one inbound frame. Returns `false` when the connection should close.
pub(crate) fn handle_frame(connection: &Connection<Message>, msg: Message) -> bool {
    match msg {
        Message::Text(text) => {
            handle_text(connection, text);
            true
        }
        Message::Binary(data) => {
            handle_binary(connection, data);
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection.id(), "received close frame");
            false
        }
        Message::Ping(_) | Message::Pong(_) => true,
    }
}

/// Handles a JSON event from a text frame. Voice frames are forwarded as received.
fn handle_text(connection: &Connection<Message>, text: Utf8Bytes) {
    match codec::decode_text(text.as_str()) {
        Ok(ClientEvent::JoinRoom(room_id)) => connection.join(room_id),
        Ok(ClientEvent::VoiceData { room_id }) => {
            connection.relay(&room_id, &Message::Text(text));
        }
        Err(e) => {
            tracing::warn!(connection_id = %connection.id(), error = %e, "dropping malformed text frame");
        }
    }
}

/// Handles a postcard-encoded frame. Voice frames are forwarded byte-for-byte.
fn handle_binary(connection: &Connection<Message>, data: axum::body::Bytes) {
    match codec::decode_binary(&data) {
        Ok(BinaryFrame::JoinRoom { room_id }) => connection.join(room_id),
        Ok(BinaryFrame::VoiceData { room_id, .. }) => {
            connection.relay(&room_id, &Message::Binary(data));
        }
        Err(e) => {
            tracing::warn!(connection_id = %connection.id(), error = %e, "dropping malformed binary frame");
        }
    }
}
