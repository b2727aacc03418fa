// End-to-end tests over a real TCP connection on an ephemeral port.

use serde_json::{json, Value};
use shardchat_core::config::StoreConfig;
use shardchat_core::{Dispatcher, Stores};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_server(max_request_bytes: usize) -> (std::net::SocketAddr, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        data_dir: dir.path().to_path_buf(),
        block_size: 200,
        token_len: 100,
    };
    let stores = Arc::new(Stores::open(&config).unwrap());
    let dispatcher = Arc::new(Dispatcher::new(stores));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(shardchat_server::serve(
        listener,
        dispatcher,
        max_request_bytes,
    ));
    (addr, dir)
}

async fn send(addr: std::net::SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    reply
}

async fn call(addr: std::net::SocketAddr, method: &str, params: Value) -> Value {
    let payload = json!({ "method": method, "params": params }).to_string();
    let reply = send(addr, payload.as_bytes()).await;
    serde_json::from_slice(&reply).expect("JSON reply")
}

#[tokio::test]
async fn test_create_user_over_tcp() {
    let (addr, _dir) = spawn_server(2048).await;

    let reply = call(
        addr,
        "user.create",
        json!({ "username": "alice", "password": "pw" }),
    )
    .await;
    let token = reply["new_token"].as_str().expect("new_token");
    assert_eq!(token.len(), 100);

    let info = call(addr, "user.getmyinfo", json!({ "access_token": token })).await;
    assert_eq!(info["username"], "alice");
}

#[tokio::test]
async fn test_full_chat_flow_over_tcp() {
    let (addr, _dir) = spawn_server(2048).await;

    let admin = call(
        addr,
        "user.create",
        json!({ "username": "admin", "password": "pw" }),
    )
    .await["new_token"]
        .as_str()
        .unwrap()
        .to_string();

    let reply = call(
        addr,
        "chat.create",
        json!({ "access_token": admin, "name": "Team", "is_visible": false }),
    )
    .await;
    let chat_id = reply["chat_id"].as_u64().unwrap();

    let reply = call(
        addr,
        "chat.sendmessage",
        json!({ "access_token": admin, "chat_id": chat_id, "text": "hello" }),
    )
    .await;
    assert_eq!(reply["error_code"], 0);

    let reply = call(
        addr,
        "chat.getlastmessages",
        json!({ "access_token": admin, "chat_id": chat_id, "num": 10 }),
    )
    .await;
    assert_eq!(reply["newest_messages"][0]["text"], "hello");
}

#[tokio::test]
async fn test_oversized_query_rejected() {
    let (addr, _dir) = spawn_server(64).await;

    let reply = send(addr, &vec![b'x'; 256]).await;
    assert_eq!(reply, b"Query is too big");
}

#[tokio::test]
async fn test_malformed_request_gets_error_reply() {
    let (addr, _dir) = spawn_server(2048).await;

    let reply = send(addr, b"not json at all").await;
    let reply: Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(reply["error_code"], 4);
    assert!(reply["error_desc"].is_string());
}
