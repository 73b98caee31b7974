//! Integration tests for the WebSocket handshake, registry lifecycle,
//! and real-time message/notification delivery.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use courier_server::auth::jwt;
use courier_server::state::AppState;
use courier_server::ws::ConnectionRegistry;

/// Start the server on a random port.
/// Returns (base_url, addr, registry handle, jwt secret).
async fn start_test_server() -> (String, SocketAddr, Arc<ConnectionRegistry>, Vec<u8>) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = courier_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret =
        jwt::load_or_generate_jwt_secret(&data_dir).expect("Failed to generate JWT secret");
    let registry = Arc::new(ConnectionRegistry::new());

    let state = AppState {
        db,
        jwt_secret: jwt_secret.clone(),
        registry: registry.clone(),
    };

    let app = courier_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr, registry, jwt_secret)
}

/// Register a user and return (user_id, access_token).
async fn register_user(base_url: &str, username: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "correct-horse-battery",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201, "Registration failed for {}", username);
    let body: serde_json::Value = resp.json().await.unwrap();
    (
        body["user_id"].as_str().unwrap().to_string(),
        body["access_token"].as_str().unwrap().to_string(),
    )
}

/// Make u2 a contact of u1 and open a chat between them; returns the chat id.
async fn create_chat(base_url: &str, u1_token: &str, u2_id: &str) -> String {
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/contacts", base_url))
        .bearer_auth(u1_token)
        .json(&json!({ "contact_id": u2_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{}/api/chats", base_url))
        .bearer_auth(u1_token)
        .json(&json!({ "recipient_id": u2_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["chat_id"].as_str().unwrap().to_string()
}

/// Expect the next frame to be a close with the given code.
async fn expect_close_code(
    stream: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    code: u16,
) {
    let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("Expected close message within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(frame.code, CloseCode::from(code), "Unexpected close code");
        }
        other => panic!("Expected close frame with code {}, got: {:?}", code, other),
    }
}

#[tokio::test]
async fn test_chat_broadcast_end_to_end() {
    let (base_url, addr, registry, _secret) = start_test_server().await;
    let (u1_id, u1_token) = register_user(&base_url, "alice").await;
    let (u2_id, u2_token) = register_user(&base_url, "bob").await;
    let chat_id = create_chat(&base_url, &u1_token, &u2_id).await;

    // Both participants connect to the chat channel.
    let url1 = format!("ws://{}/ws/chats/{}?token={}", addr, chat_id, u1_token);
    let url2 = format!("ws://{}/ws/chats/{}?token={}", addr, chat_id, u2_token);
    let (ws1, _) = tokio_tungstenite::connect_async(&url1).await.unwrap();
    let (ws2, _) = tokio_tungstenite::connect_async(&url2).await.unwrap();
    let (mut write1, mut read1) = ws1.split();
    let (_write2, mut read2) = ws2.split();

    // Give the upgrade callbacks a moment to register both connections.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.members_of(&chat_id).len(), 2);

    // Alice posts a message over REST.
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/chats/{}/messages", base_url, chat_id))
        .bearer_auth(&u1_token)
        .json(&json!({ "content": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Both sockets receive the new_message event.
    for read in [&mut read1, &mut read2] {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Expected broadcast within timeout")
            .unwrap()
            .unwrap();
        let text = msg.into_text().unwrap();
        let event: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(event["type"], "new_message");
        assert_eq!(event["chat_id"], chat_id.as_str());
        assert_eq!(event["message"]["content"], "hello");
        assert_eq!(event["message"]["sender_id"], u1_id.as_str());
        assert_eq!(event["message"]["status"], "sent");
    }

    // Alice disconnects; only Bob's connection remains registered.
    write1.send(Message::Close(None)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let members = registry.members_of(&chat_id);
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, u2_id);
}

#[tokio::test]
async fn test_expired_token_rejected_without_registry_mutation() {
    let (_base_url, addr, registry, secret) = start_test_server().await;

    // Well past the validator's 60s expiry leeway.
    let expired = jwt::issue_token(&secret, "some-user", jwt::TOKEN_TYPE_ACCESS, -3600).unwrap();
    let url = format!("ws://{}/ws/notifications?token={}", addr, expired);
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("WebSocket should upgrade even with expired token");
    let (_write, mut read) = ws.split();

    expect_close_code(&mut read, 4001).await;
    assert_eq!(registry.channel_count(), 0);
}

#[tokio::test]
async fn test_garbage_token_rejected() {
    let (_base_url, addr, registry, _secret) = start_test_server().await;

    let url = format!("ws://{}/ws/notifications?token=not_a_jwt", addr);
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (_write, mut read) = ws.split();

    expect_close_code(&mut read, 4002).await;
    assert_eq!(registry.channel_count(), 0);
}

#[tokio::test]
async fn test_refresh_token_rejected_on_upgrade() {
    let (base_url, addr, registry, _secret) = start_test_server().await;
    let (_u1_id, _u1_token) = register_user(&base_url, "carol").await;

    // Mint a real refresh token via login; it must not pass the access gate.
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({ "email": "carol@example.com", "password": "correct-horse-battery" }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    let refresh_token = body["refresh_token"].as_str().unwrap();

    let url = format!("ws://{}/ws/notifications?token={}", addr, refresh_token);
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (_write, mut read) = ws.split();

    expect_close_code(&mut read, 4002).await;
    assert_eq!(registry.channel_count(), 0);
}

#[tokio::test]
async fn test_non_participant_rejected() {
    let (base_url, addr, registry, _secret) = start_test_server().await;
    let (_u1_id, u1_token) = register_user(&base_url, "dave").await;
    let (u2_id, _u2_token) = register_user(&base_url, "erin").await;
    let (_u3_id, u3_token) = register_user(&base_url, "mallory").await;
    let chat_id = create_chat(&base_url, &u1_token, &u2_id).await;

    // Valid token, but mallory is not a participant of the chat.
    let url = format!("ws://{}/ws/chats/{}?token={}", addr, chat_id, u3_token);
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (_write, mut read) = ws.split();

    expect_close_code(&mut read, 4003).await;
    assert_eq!(registry.channel_count(), 0);
}

#[tokio::test]
async fn test_unknown_chat_rejected() {
    let (base_url, addr, registry, _secret) = start_test_server().await;
    let (_u1_id, u1_token) = register_user(&base_url, "frank").await;

    let url = format!("ws://{}/ws/chats/no-such-chat?token={}", addr, u1_token);
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (_write, mut read) = ws.split();

    expect_close_code(&mut read, 4003).await;
    assert_eq!(registry.channel_count(), 0);
}

#[tokio::test]
async fn test_notification_pushed_to_personal_channel() {
    let (base_url, addr, registry, _secret) = start_test_server().await;
    let (_u1_id, u1_token) = register_user(&base_url, "grace").await;
    let (u2_id, u2_token) = register_user(&base_url, "heidi").await;

    let url = format!("ws://{}/ws/notifications?token={}", addr, u2_token);
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (_write, mut read) = ws.split();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.members_of(&u2_id).len(), 1);

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/notifications", base_url))
        .bearer_auth(&u1_token)
        .json(&json!({
            "user_id": u2_id,
            "message": "grace added you as a contact",
            "notification_type": "friend_request",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected notification within timeout")
        .unwrap()
        .unwrap();
    let event: serde_json::Value = serde_json::from_str(msg.into_text().unwrap().as_str()).unwrap();
    assert_eq!(event["type"], "notification");
    assert_eq!(event["notification"]["user_id"], u2_id.as_str());
    assert_eq!(event["notification"]["notification_type"], "friend_request");
}

#[tokio::test]
async fn test_server_answers_client_ping() {
    let (base_url, addr, _registry, _secret) = start_test_server().await;
    let (_u1_id, u1_token) = register_user(&base_url, "ivan").await;

    let url = format!("ws://{}/ws/notifications?token={}", addr, u1_token);
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

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
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_inbound_frames_are_drained_not_echoed() {
    let (base_url, addr, _registry, _secret) = start_test_server().await;
    let (_u1_id, u1_token) = register_user(&base_url, "judy").await;

    let url = format!("ws://{}/ws/notifications?token={}", addr, u1_token);
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut write, mut read) = ws.split();

    write
        .send(Message::Text("keep-alive chatter".into()))
        .await
        .unwrap();

    // The protocol defines no inbound operations, so nothing comes back.
    let result = tokio::time::timeout(Duration::from_millis(500), read.next()).await;
    assert!(result.is_err(), "Expected no response to inbound text frame");
}
