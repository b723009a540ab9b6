//! Websocket protocol tests against a live server on an ephemeral port.

use concord::api::create_app;
use concord::core::config::Config;
use concord::core::create_app_state;
use concord::schema::{number, string, struct_of, Primitive};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value as Json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn schema() -> Primitive {
    struct_of(vec![
        ("title", string().default_value("")),
        ("count", number().default_value(0i64)),
    ])
}

async fn spawn_server() -> SocketAddr {
    let state = create_app_state(Config::default(), schema()).unwrap();
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, document: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/doc/{}", addr, document))
        .await
        .unwrap();
    socket
}

async fn send(socket: &mut Socket, frame: Json) {
    socket
        .send(Message::Text(frame.to_string()))
        .await
        .unwrap();
}

/// Receive the next text frame as JSON, with a hang guard
async fn recv(socket: &mut Socket) -> Json {
    let deadline = Duration::from_secs(5);
    loop {
        let frame = tokio::time::timeout(deadline, socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("transport error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn authenticate(socket: &mut Socket, token: &str) {
    send(socket, json!({"type": "auth", "token": token})).await;
    let result = recv(socket).await;
    assert_eq!(result["type"], json!("auth_result"));
    assert_eq!(result["success"], json!(true));
    // presence is enabled by default, so a snapshot follows
    let snapshot = recv(socket).await;
    assert_eq!(snapshot["type"], json!("presence_snapshot"));
}

#[tokio::test]
async fn test_ping_pong_without_auth() {
    let addr = spawn_server().await;
    let mut socket = connect(addr, "room").await;
    send(&mut socket, json!({"type": "ping"})).await;
    assert_eq!(recv(&mut socket).await["type"], json!("pong"));
}

#[tokio::test]
async fn test_submit_requires_auth() {
    let addr = spawn_server().await;
    let mut socket = connect(addr, "room").await;
    send(
        &mut socket,
        json!({
            "type": "submit",
            "transaction": {"id": "tx-1", "ops": [], "timestamp": 0}
        }),
    )
    .await;
    let error = recv(&mut socket).await;
    assert_eq!(error["type"], json!("error"));
    assert_eq!(error["reason"], json!("Not authenticated"));
    assert_eq!(error["transactionId"], json!("tx-1"));
}

#[tokio::test]
async fn test_auth_submit_broadcast_snapshot() {
    let addr = spawn_server().await;
    let mut alice = connect(addr, "room").await;
    let mut bob = connect(addr, "room").await;
    authenticate(&mut alice, "alice").await;
    authenticate(&mut bob, "bob").await;

    let tx = json!({
        "id": "tx-hello",
        "ops": [{
            "kind": "string.set",
            "path": {"segments": ["title"]},
            "payload": "Hello"
        }],
        "timestamp": 1
    });
    send(&mut alice, json!({"type": "submit", "transaction": tx})).await;

    // both subscribers receive the same broadcast, submitter included
    for socket in [&mut alice, &mut bob] {
        let broadcast = recv(socket).await;
        assert_eq!(broadcast["type"], json!("transaction"));
        assert_eq!(broadcast["version"], json!(1));
        assert_eq!(broadcast["transaction"]["id"], json!("tx-hello"));
    }

    send(&mut bob, json!({"type": "request_snapshot"})).await;
    let snapshot = recv(&mut bob).await;
    assert_eq!(snapshot["type"], json!("snapshot"));
    assert_eq!(snapshot["version"], json!(1));
    assert_eq!(snapshot["state"]["title"], json!("Hello"));
    assert_eq!(snapshot["state"]["count"], json!(0.0));
}

#[tokio::test]
async fn test_invalid_transaction_is_rejected_with_reason() {
    let addr = spawn_server().await;
    let mut socket = connect(addr, "room").await;
    authenticate(&mut socket, "alice").await;

    send(
        &mut socket,
        json!({
            "type": "submit",
            "transaction": {"id": "tx-bad", "ops": [], "timestamp": 0}
        }),
    )
    .await;
    let error = recv(&mut socket).await;
    assert_eq!(error["type"], json!("error"));
    assert_eq!(error["reason"], json!("Transaction is empty"));
}

#[tokio::test]
async fn test_presence_no_echo() {
    let addr = spawn_server().await;
    let mut alice = connect(addr, "room").await;
    let mut bob = connect(addr, "room").await;
    authenticate(&mut alice, "alice").await;
    authenticate(&mut bob, "bob").await;

    send(&mut alice, json!({"type": "presence_set", "data": {"cursor": 7}})).await;

    // bob sees the update
    let update = recv(&mut bob).await;
    assert_eq!(update["type"], json!("presence_update"));
    assert_eq!(update["data"], json!({"cursor": 7}));
    assert_eq!(update["userId"], json!("alice"));

    // alice hears nothing back; a ping answers first
    send(&mut alice, json!({"type": "ping"})).await;
    assert_eq!(recv(&mut alice).await["type"], json!("pong"));

    // clearing presence reaches bob as a removal
    send(&mut alice, json!({"type": "presence_clear"})).await;
    let removal = recv(&mut bob).await;
    assert_eq!(removal["type"], json!("presence_remove"));
}

#[tokio::test]
async fn test_presence_snapshot_excludes_self() {
    let addr = spawn_server().await;
    let mut alice = connect(addr, "room").await;
    authenticate(&mut alice, "alice").await;
    send(&mut alice, json!({"type": "presence_set", "data": {"here": true}})).await;
    // give the presence write a moment to land
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut bob = connect(addr, "room").await;
    send(&mut bob, json!({"type": "auth", "token": "bob"})).await;
    let result = recv(&mut bob).await;
    assert_eq!(result["success"], json!(true));
    let snapshot = recv(&mut bob).await;
    assert_eq!(snapshot["type"], json!("presence_snapshot"));
    let presences = snapshot["presences"].as_object().unwrap();
    assert_eq!(presences.len(), 1);
    let entry = presences.values().next().unwrap();
    assert_eq!(entry["data"], json!({"here": true}));
    assert_eq!(entry["userId"], json!("alice"));
}

#[tokio::test]
async fn test_nested_prefix_and_encoded_document_ids() {
    let addr = spawn_server().await;
    let (mut socket, _) = connect_async(format!(
        "ws://{}/team/acme/doc/board%3A1",
        addr
    ))
    .await
    .unwrap();
    authenticate(&mut socket, "alice").await;

    send(
        &mut socket,
        json!({
            "type": "submit",
            "transaction": {
                "id": "tx-1",
                "ops": [{"kind": "number.set", "path": {"segments": ["count"]}, "payload": 9}],
                "timestamp": 0
            }
        }),
    )
    .await;
    let broadcast = recv(&mut socket).await;
    assert_eq!(broadcast["type"], json!("transaction"));

    // the same id, reached through a plain path, shares the document
    let mut other = connect(addr, "board%3A1").await;
    authenticate(&mut other, "bob").await;
    send(&mut other, json!({"type": "request_snapshot"})).await;
    let snapshot = recv(&mut other).await;
    assert_eq!(snapshot["state"]["count"], json!(9.0));
}

#[tokio::test]
async fn test_documents_are_isolated() {
    let addr = spawn_server().await;
    let mut a = connect(addr, "doc-A").await;
    let mut b = connect(addr, "doc-B").await;
    authenticate(&mut a, "alice").await;
    authenticate(&mut b, "bob").await;

    send(
        &mut a,
        json!({
            "type": "submit",
            "transaction": {
                "id": "tx-a",
                "ops": [{"kind": "string.set", "path": {"segments": ["title"]}, "payload": "A"}],
                "timestamp": 0
            }
        }),
    )
    .await;
    assert_eq!(recv(&mut a).await["type"], json!("transaction"));

    send(&mut b, json!({"type": "request_snapshot"})).await;
    let snapshot = recv(&mut b).await;
    assert_eq!(snapshot["version"], json!(0));
    assert_eq!(snapshot["state"]["title"], json!(""));
}
