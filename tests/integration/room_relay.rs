// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::future_not_send
)]

//! End-to-end tests for the room relay over real WebSocket connections.
//!
//! Validates:
//! - A relay from one member reaches every other member, never the sender
//! - Non-members never receive a room's traffic
//! - Disconnected clients stop receiving and drop out of membership
//! - One client can sit in several rooms at once
//! - Relaying into an empty room is a silent no-op
//! - Text and binary voice frames are forwarded byte-for-byte

use std::sync::Arc;
use std::time::Duration;

use callroom_proto::codec;
use callroom_proto::event::BinaryFrame;
use callroom_proto::room::RoomId;
use callroom_relay::config::CallroomConfig;
use callroom_relay::server::{self, AppState, SharedState};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// How long to wait before concluding that nothing is coming.
const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Start the server in-process; returns its state, ws:// URL and task handle.
async fn start_relay() -> (SharedState, String, tokio::task::JoinHandle<()>) {
    let config = CallroomConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..CallroomConfig::default()
    };
    let state = AppState::new(&config);
    let (addr, handle) = server::start_server_with_state(&config, Arc::clone(&state))
        .await
        .expect("failed to start server");
    (state, format!("ws://{addr}/ws"), handle)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

async fn join(ws: &mut WsStream, room: &str) {
    let frame = format!(r#"{{"event":"join-room","data":"{room}"}}"#);
    ws.send(Message::text(frame)).await.unwrap();
}

fn voice(room: &str, audio: &str) -> String {
    format!(r#"{{"event":"voice-data","data":{{"roomId":"{room}","audio":"{audio}"}}}}"#)
}

/// Polls `cond` until it holds, failing the test after five seconds.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_members(state: &SharedState, room: &str, count: usize) {
    let room = RoomId::new(room);
    wait_until(|| state.hub.member_count(&room) == count).await;
}

async fn recv_text(ws: &mut WsStream) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for message")
        .expect("stream ended")
        .expect("WebSocket error");
    match msg {
        Message::Text(text) => text.to_string(),
        other => panic!("expected Text, got {other:?}"),
    }
}

async fn assert_silent(ws: &mut WsStream) {
    let result = tokio::time::timeout(QUIET_PERIOD, ws.next()).await;
    assert!(result.is_err(), "expected no message, got {result:?}");
}

#[tokio::test]
async fn call_scenario_relay_then_disconnect() {
    let (state, url, _handle) = start_relay().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;

    join(&mut alice, "call-42").await;
    join(&mut bob, "call-42").await;
    wait_for_members(&state, "call-42", 2).await;

    let frame = voice("call-42", "<bytes>");
    alice.send(Message::text(frame.clone())).await.unwrap();

    assert_eq!(recv_text(&mut bob).await, frame);
    assert_silent(&mut alice).await;

    bob.close(None).await.unwrap();
    wait_for_members(&state, "call-42", 1).await;
    wait_until(|| state.hub.connection_count() == 1).await;

    alice
        .send(Message::text(voice("call-42", "again")))
        .await
        .unwrap();
    assert_silent(&mut alice).await;
    assert_eq!(state.hub.room_count(), 1);
}

#[tokio::test]
async fn non_members_receive_nothing() {
    let (state, url, _handle) = start_relay().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    let mut carol = connect(&url).await;

    join(&mut alice, "room-a").await;
    join(&mut bob, "room-a").await;
    join(&mut carol, "room-b").await;
    wait_for_members(&state, "room-a", 2).await;
    wait_for_members(&state, "room-b", 1).await;

    let frame = voice("room-a", "secret");
    alice.send(Message::text(frame.clone())).await.unwrap();

    assert_eq!(recv_text(&mut bob).await, frame);
    assert_silent(&mut carol).await;
}

#[tokio::test]
async fn every_other_member_receives() {
    let (state, url, _handle) = start_relay().await;
    let mut clients = Vec::new();
    for _ in 0..4 {
        let mut ws = connect(&url).await;
        join(&mut ws, "conference").await;
        clients.push(ws);
    }
    wait_for_members(&state, "conference", 4).await;

    let frame = voice("conference", "hello all");
    clients[0].send(Message::text(frame.clone())).await.unwrap();

    for ws in &mut clients[1..] {
        assert_eq!(recv_text(ws).await, frame);
    }
    assert_silent(&mut clients[0]).await;
}

#[tokio::test]
async fn one_client_in_several_rooms() {
    let (state, url, _handle) = start_relay().await;
    let mut hub_client = connect(&url).await;
    let mut left = connect(&url).await;
    let mut right = connect(&url).await;

    join(&mut hub_client, "left").await;
    join(&mut hub_client, "right").await;
    join(&mut left, "left").await;
    join(&mut right, "right").await;
    wait_for_members(&state, "left", 2).await;
    wait_for_members(&state, "right", 2).await;

    let from_left = voice("left", "L");
    left.send(Message::text(from_left.clone())).await.unwrap();
    assert_eq!(recv_text(&mut hub_client).await, from_left);
    assert_silent(&mut right).await;

    let from_right = voice("right", "R");
    right.send(Message::text(from_right.clone())).await.unwrap();
    assert_eq!(recv_text(&mut hub_client).await, from_right);
    assert_silent(&mut left).await;
}

#[tokio::test]
async fn relay_into_empty_room_is_noop() {
    let (state, url, _handle) = start_relay().await;
    let mut alice = connect(&url).await;
    join(&mut alice, "lonely").await;
    wait_for_members(&state, "lonely", 1).await;

    alice
        .send(Message::text(voice("lonely", "echo?")))
        .await
        .unwrap();
    alice
        .send(Message::text(voice("nobody-here", "hello?")))
        .await
        .unwrap();

    assert_silent(&mut alice).await;
    assert_eq!(state.hub.connection_count(), 1);
}

#[tokio::test]
async fn malformed_frames_do_not_close_connection() {
    let (state, url, _handle) = start_relay().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    join(&mut alice, "r").await;
    join(&mut bob, "r").await;
    wait_for_members(&state, "r", 2).await;

    alice.send(Message::text("not json")).await.unwrap();
    alice
        .send(Message::text(r#"{"event":"voice-data","data":{"audio":"x"}}"#))
        .await
        .unwrap();

    let frame = voice("r", "still here");
    alice.send(Message::text(frame.clone())).await.unwrap();
    assert_eq!(recv_text(&mut bob).await, frame);
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn text_voice_frames_are_forwarded_verbatim() {
    let (state, url, _handle) = start_relay().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;
    join(&mut alice, "exact").await;
    join(&mut bob, "exact").await;
    wait_for_members(&state, "exact", 2).await;

    let numbers = r#"{"event": "voice-data", "data": {"e": 1e2, "big": 123456789012345678901234567890, "pi": 3.141592653589793238462643383279, "roomId": "exact"}}"#;
    alice.send(Message::text(numbers)).await.unwrap();
    assert_eq!(recv_text(&mut bob).await, numbers);

    let depth = 300;
    let deep = format!(
        r#"{{"event":"voice-data","data":{{"roomId":"exact","tree":{}{}}}}}"#,
        "[".repeat(depth),
        "]".repeat(depth)
    );
    alice.send(Message::text(deep.clone())).await.unwrap();
    assert_eq!(recv_text(&mut bob).await, deep);
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn binary_voice_frames_are_forwarded_verbatim() {
    let (state, url, _handle) = start_relay().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;

    for ws in [&mut alice, &mut bob] {
        let join = codec::encode_binary(&BinaryFrame::JoinRoom {
            room_id: RoomId::new("pcm"),
        })
        .unwrap();
        ws.send(Message::binary(join)).await.unwrap();
    }
    wait_for_members(&state, "pcm", 2).await;

    let frame = codec::encode_binary(&BinaryFrame::VoiceData {
        room_id: RoomId::new("pcm"),
        audio: (0..=255).collect(),
    })
    .unwrap();
    alice.send(Message::binary(frame.clone())).await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), bob.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match msg {
        Message::Binary(data) => assert_eq!(&data[..], frame.as_slice()),
        other => panic!("expected Binary, got {other:?}"),
    }
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn dropped_socket_cleans_up_membership() {
    let (state, url, _handle) = start_relay().await;
    let mut alice = connect(&url).await;
    join(&mut alice, "transient").await;
    wait_for_members(&state, "transient", 1).await;

    drop(alice);

    wait_until(|| state.hub.connection_count() == 0).await;
    assert_eq!(state.hub.room_count(), 0);
}
