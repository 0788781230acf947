//! Integration tests for the WebSocket endpoint: registration, broadcasts,
//! disconnect cleanup, remote logout and the presence snapshot endpoint.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use presence_server::presence::reconciler;
use presence_server::presence::record::DEFAULT_PRESENCE_TTL;
use presence_server::state::AppState;
use presence_server::store::{MemoryStore, PresenceStore};
use presence_server::ws::protocol::ServerEvent;

type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;
type WsWrite = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

const SOCKET_PATH: &str = "/api/socket";

/// Helper: start a server process on a random port backed by `store`.
async fn start_test_server(store: Arc<MemoryStore>) -> SocketAddr {
    start_test_server_with(store, DEFAULT_PRESENCE_TTL, None).await
}

async fn start_test_server_with(
    store: Arc<MemoryStore>,
    presence_ttl: Duration,
    refresh_interval: Option<Duration>,
) -> SocketAddr {
    let state = AppState::new(store, presence_ttl, refresh_interval);
    reconciler::spawn(state.clone())
        .await
        .expect("Failed to subscribe reconciler");

    let app = presence_server::routes::build_router(state, SOCKET_PATH);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Connect a client and consume the snapshot every new connection receives.
async fn connect_client(addr: SocketAddr) -> (WsWrite, WsRead) {
    let ws_url = format!("ws://{}{}", addr, SOCKET_PATH);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    let (write, mut read) = ws_stream.split();

    match next_event(&mut read).await {
        ServerEvent::OnlineUsers(_) => {}
        other => panic!("Expected initial onlineUsers, got: {:?}", other),
    }
    (write, read)
}

/// Read the next server event, skipping control frames.
async fn next_event(read: &mut WsRead) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Expected a message within timeout");
        match msg {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(text.as_str()).expect("Server event should be JSON")
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("Expected text frame, got: {:?}", other),
        }
    }
}

async fn send_register(write: &mut WsWrite, id: &str, diuc: &str) {
    let frame = json!({"event": "register", "data": {"id": id, "diuc": diuc}}).to_string();
    write
        .send(Message::Text(frame.into()))
        .await
        .expect("Failed to send register");
}

fn online_ids(event: &ServerEvent) -> Vec<String> {
    match event {
        ServerEvent::OnlineUsers(users) => users
            .iter()
            .map(|u| u.user_id().unwrap_or_default().to_string())
            .collect(),
        ServerEvent::Logout => panic!("Expected onlineUsers, got logout"),
    }
}

#[tokio::test]
async fn test_ws_connect_receives_empty_snapshot() {
    let addr = start_test_server(Arc::new(MemoryStore::new())).await;
    let (_write, mut read) = connect_client(addr).await;

    // Nothing else arrives until something changes
    let result = tokio::time::timeout(Duration::from_millis(300), read.next()).await;
    assert!(result.is_err(), "Expected no further messages");
}

#[tokio::test]
async fn test_ws_register_broadcasts_to_every_client() {
    let store = Arc::new(MemoryStore::new());
    let addr = start_test_server(store.clone()).await;
    let (mut write_a, mut read_a) = connect_client(addr).await;
    let (_write_b, mut read_b) = connect_client(addr).await;

    send_register(&mut write_a, "u1", "A1").await;

    for read in [&mut read_a, &mut read_b] {
        match next_event(read).await {
            ServerEvent::OnlineUsers(users) => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].user_id(), Some("u1"));
                assert_eq!(users[0].identity.get("diuc"), Some(&json!("A1")));
                assert!(users[0].online);
            }
            other => panic!("Expected onlineUsers, got: {:?}", other),
        }
    }

    assert!(store.get("userStatus:u1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_ws_disconnect_clears_presence() {
    let store = Arc::new(MemoryStore::new());
    let addr = start_test_server(store.clone()).await;
    let (mut write_a, mut read_a) = connect_client(addr).await;
    let (_write_b, mut read_b) = connect_client(addr).await;

    send_register(&mut write_a, "u1", "A1").await;
    assert_eq!(online_ids(&next_event(&mut read_a).await), vec!["u1"]);
    assert_eq!(online_ids(&next_event(&mut read_b).await), vec!["u1"]);

    write_a
        .send(Message::Close(None))
        .await
        .expect("Failed to send close");

    assert!(online_ids(&next_event(&mut read_b).await).is_empty());
    assert_eq!(store.get("userStatus:u1").await.unwrap(), None);
}

#[tokio::test]
async fn test_ws_remote_logout_reaches_the_user_connection() {
    let store = Arc::new(MemoryStore::new());
    let addr = start_test_server(store.clone()).await;
    let (mut write, mut read) = connect_client(addr).await;

    send_register(&mut write, "u1", "A1").await;
    assert_eq!(online_ids(&next_event(&mut read).await), vec!["u1"]);

    store
        .publish("logout", r#"{"userId":"u1"}"#)
        .await
        .unwrap();

    assert_eq!(next_event(&mut read).await, ServerEvent::Logout);
    assert!(online_ids(&next_event(&mut read).await).is_empty());
    assert_eq!(store.get("userStatus:u1").await.unwrap(), None);
}

#[tokio::test]
async fn test_ws_logout_on_one_process_leaves_other_process_clients_informed() {
    let store = Arc::new(MemoryStore::new());
    let addr_a = start_test_server(store.clone()).await;
    let addr_b = start_test_server(store.clone()).await;
    let (mut write_a, mut read_a) = connect_client(addr_a).await;
    let (_write_b, mut read_b) = connect_client(addr_b).await;

    send_register(&mut write_a, "u1", "A1").await;
    assert_eq!(online_ids(&next_event(&mut read_a).await), vec!["u1"]);

    store
        .publish("logout", r#"{"userId":"u1"}"#)
        .await
        .unwrap();

    assert_eq!(next_event(&mut read_a).await, ServerEvent::Logout);
    // Process B only knows its own (empty) registry but still rebroadcasts.
    assert!(online_ids(&next_event(&mut read_b).await).is_empty());
}

#[tokio::test]
async fn test_ws_open_socket_refreshes_record_past_ttl() {
    let store = Arc::new(MemoryStore::new());
    let addr = start_test_server_with(
        store.clone(),
        Duration::from_millis(400),
        Some(Duration::from_millis(100)),
    )
    .await;
    let (mut write, mut read) = connect_client(addr).await;

    send_register(&mut write, "u1", "A1").await;
    assert_eq!(online_ids(&next_event(&mut read).await), vec!["u1"]);

    // Several TTLs pass while the socket stays open.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(
        store.get("userStatus:u1").await.unwrap().is_some(),
        "record should be kept alive by the refresh timer"
    );
}

#[tokio::test]
async fn test_ws_record_expires_without_refresh() {
    let store = Arc::new(MemoryStore::new());
    let addr = start_test_server_with(store.clone(), Duration::from_millis(400), None).await;
    let (mut write, mut read) = connect_client(addr).await;

    send_register(&mut write, "u1", "A1").await;
    assert_eq!(online_ids(&next_event(&mut read).await), vec!["u1"]);

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(store.get("userStatus:u1").await.unwrap(), None);
}

#[tokio::test]
async fn test_ws_unparseable_frame_is_ignored() {
    let addr = start_test_server(Arc::new(MemoryStore::new())).await;
    let (mut write, mut read) = connect_client(addr).await;

    write
        .send(Message::Text("definitely not json".to_string().into()))
        .await
        .unwrap();
    send_register(&mut write, "u2", "B2").await;

    assert_eq!(online_ids(&next_event(&mut read).await), vec!["u2"]);
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let addr = start_test_server(Arc::new(MemoryStore::new())).await;
    let (mut write, mut read) = connect_client(addr).await;

    write
        .send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected pong within timeout");

    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => {
            panic!("Expected Pong message, got: {:?}", other);
        }
    }
}

#[tokio::test]
async fn test_presence_endpoint_returns_snapshot() {
    let addr = start_test_server(Arc::new(MemoryStore::new())).await;
    let (mut write, mut read) = connect_client(addr).await;
    send_register(&mut write, "u1", "A1").await;
    next_event(&mut read).await;

    let resp = reqwest::get(format!("http://{}/api/presence", addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    let users = body.as_array().expect("array body");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"], json!("u1"));
    assert_eq!(users[0]["diuc"], json!("A1"));
    assert_eq!(users[0]["online"], json!(true));
}

#[tokio::test]
async fn test_health_check() {
    let addr = start_test_server(Arc::new(MemoryStore::new())).await;
    let resp = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}
