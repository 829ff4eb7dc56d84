#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use notify_api::config::Config;
use notify_api::store::{MemoryNotificationStore, NotificationStore};
use notify_api::AppState;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Build an AppState over a fresh in-memory store.
pub fn test_state_with(config: Config) -> (AppState, Arc<MemoryNotificationStore>) {
    let store = Arc::new(MemoryNotificationStore::new());
    let state = AppState::new(config, store.clone() as Arc<dyn NotificationStore>);
    (state, store)
}

pub fn test_state() -> (AppState, Arc<MemoryNotificationStore>) {
    test_state_with(Config::default())
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState, Arc<MemoryNotificationStore>) {
    let (state, store) = test_state();
    let app = notify_api::routes::router().with_state(state.clone());
    (app, state, store)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_server(state: AppState) -> SocketAddr {
    start_router(notify_api::routes::router().with_state(state)).await
}

pub async fn start_router(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

pub fn new_user_id() -> String {
    steeple_common::id::prefixed_ulid(steeple_common::id::prefix::USER)
}

pub async fn connect(addr: SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

pub async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Connect, send auth, and consume the ack.
pub async fn connect_and_auth(addr: SocketAddr, user_id: &str) -> WsStream {
    let mut ws = connect(addr).await;
    send_json(&mut ws, serde_json::json!({ "type": "auth", "userId": user_id })).await;

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "auth_success");
    assert_eq!(ack["message"], "Authenticated successfully");
    ws
}

/// Next text frame as JSON, skipping transport frames.
pub async fn next_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");

        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("parse frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Read until the server's close frame arrives.
pub async fn expect_close(ws: &mut WsStream) -> CloseFrame {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close")
            .expect("stream ended before close")
            .expect("ws read error");

        if let Message::Close(frame) = msg {
            return frame.expect("close frame without code");
        }
    }
}

/// Assert no text frame arrives within `wait`.
pub async fn expect_silence(ws: &mut WsStream, wait: Duration) {
    let deadline = time::Instant::now() + wait;
    loop {
        match time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}

/// Poll `cond` until it holds or five seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(time::Instant::now() < deadline, "condition not reached in time");
        time::sleep(Duration::from_millis(20)).await;
    }
}
