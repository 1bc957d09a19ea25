//! Integration tests for the Huddle server
//!
//! Each test starts the full router on a random port backed by the
//! in-memory store, so no database is needed.
//!
//! Run with: cargo test -p huddle-server --test integration_tests

use futures_util::{SinkExt, StreamExt};
use huddle_server::auth::{create_token, Claims};
use huddle_server::db::{MemoryStore, Store};
use huddle_server::state::Config;
use huddle_server::ws::{LocalHub, RelayBus, RelayHub, RoomHub};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

const SECRET: &str = "test-secret-key-for-testing-only";

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test server wrapper
struct TestServer {
    addr: std::net::SocketAddr,
    client: Client,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> TestServer {
        Self::start_with(Arc::new(MemoryStore::new()), Arc::new(LocalHub::new())).await
    }

    async fn start_with(store: Arc<dyn Store>, hub: Arc<dyn RoomHub>) -> TestServer {
        let router = huddle_server::create_app_with(Config::in_memory(SECRET), store, hub);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        Self {
            addr,
            client: Client::new(),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn user(&self, name: &str) -> User {
        let claims = Claims::new(&format!("ext-{name}"), name, &format!("{name}@test.com"), 1);
        let token = create_token(&claims, SECRET).unwrap();
        let me: Value = self
            .client
            .get(self.url("/api/profiles/me"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        User {
            token,
            profile_id: id(&me["id"]),
        }
    }

    async fn get(&self, user: &User, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&user.token)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, user: &User, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&user.token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn patch(&self, user: &User, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .patch(self.url(path))
            .bearer_auth(&user.token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, user: &User, path: &str) -> StatusCode {
        self.client
            .delete(self.url(path))
            .bearer_auth(&user.token)
            .send()
            .await
            .unwrap()
            .status()
    }

    /// Socket bound to the user's profile, already in the profile room.
    async fn connect(&self, user: &User) -> Ws {
        let url = format!("ws://{}/ws?token={}", self.addr, user.token);
        let (mut ws, _) = connect_async(url).await.expect("Failed to connect WebSocket");
        // The handshake can finish before the profile room is joined
        drain_until_pong(&mut ws).await;
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

struct User {
    token: String,
    profile_id: Uuid,
}

/// A server created by its owner with one guest already joined.
struct Guild {
    server_id: Uuid,
    general_id: Uuid,
    owner_member_id: Uuid,
}

fn id(value: &Value) -> Uuid {
    Uuid::parse_str(value.as_str().expect("expected a string id")).unwrap()
}

async fn create_guild(server: &TestServer, owner: &User, guests: &[&User]) -> Guild {
    let (status, created) = server
        .post(owner, "/api/servers", json!({ "name": "Rustaceans" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["channels"][0]["name"], "general");

    let code = created["server"]["inviteCode"].as_str().unwrap().to_string();
    for guest in guests {
        let (status, _) = server
            .post(guest, &format!("/api/invites/{code}"), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    Guild {
        server_id: id(&created["server"]["id"]),
        general_id: id(&created["channels"][0]["id"]),
        owner_member_id: id(&created["member"]["id"]),
    }
}

async fn send(ws: &mut Ws, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn next_event(ws: &mut Ws) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timed out waiting for event")
            .expect("Socket closed")
            .expect("Socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skip frames until one with the given event name arrives.
async fn expect_event(ws: &mut Ws, name: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["event"] == name {
            return event;
        }
    }
}

/// Everything received before the answer to a fresh ping. A connection's
/// frames are handled in order, so this flushes whatever is already queued.
async fn drain_until_pong(ws: &mut Ws) -> Vec<Value> {
    send(ws, json!({ "event": "ping" })).await;
    let mut seen = Vec::new();
    loop {
        let event = next_event(ws).await;
        if event["event"] == "pong" {
            return seen;
        }
        seen.push(event);
    }
}

async fn join_channel(ws: &mut Ws, channel_id: Uuid) {
    send(ws, json!({ "event": "channel:join", "data": { "channelId": channel_id } })).await;
    let ack = expect_event(ws, "room:joined").await;
    assert_eq!(ack["data"]["room"], format!("channel:{channel_id}"));
}

async fn total_unread(server: &TestServer, user: &User, server_id: Uuid) -> i64 {
    let (status, body) = server
        .get(user, &format!("/api/servers/{server_id}/unread/total"))
        .await;
    assert_eq!(status, StatusCode::OK);
    body["totalUnread"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await;
    let response = server.client.get(server.url("/health")).send().await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let server = TestServer::start().await;
    let response = server
        .client
        .get(server.url("/api/servers"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unread_scenario_across_mark_read() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let guild = create_guild(&server, &alice, &[&bob]).await;
    let messages = format!("/api/channels/{}/messages", guild.general_id);

    let (status, _) = server.post(&alice, &messages, json!({ "content": "hi" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(total_unread(&server, &bob, guild.server_id).await, 1);
    assert_eq!(total_unread(&server, &alice, guild.server_id).await, 0);

    let (_, per_channel) = server
        .get(&bob, &format!("/api/servers/{}/unread", guild.server_id))
        .await;
    assert_eq!(per_channel[guild.general_id.to_string()], 1);

    let (status, read) = server
        .post(
            &bob,
            &format!("/api/channels/{}/read", guild.general_id),
            json!({ "serverId": guild.server_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["totalUnread"], 0);
    assert_eq!(total_unread(&server, &bob, guild.server_id).await, 0);

    server.post(&alice, &messages, json!({ "content": "there" })).await;
    assert_eq!(total_unread(&server, &bob, guild.server_id).await, 1);

    let (_, servers) = server.get(&bob, "/api/servers").await;
    assert_eq!(servers["data"][0]["unreadCount"], 1);
    assert_eq!(servers["total"], 1);
    let (_, badges) = server
        .get(&bob, &format!("/api/notification/server/{}", bob.profile_id))
        .await;
    assert_eq!(badges[0]["serverId"], json!(guild.server_id));
    assert_eq!(badges[0]["unreadCount"], 1);
}

#[tokio::test]
async fn test_mark_read_twice_is_idempotent() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let guild = create_guild(&server, &alice, &[&bob]).await;
    server
        .post(
            &alice,
            &format!("/api/channels/{}/messages", guild.general_id),
            json!({ "content": "hi" }),
        )
        .await;

    let read_path = format!("/api/channels/{}/read", guild.general_id);
    let body = json!({ "serverId": guild.server_id });
    let (_, first) = server.post(&bob, &read_path, body.clone()).await;
    let (_, second) = server.post(&bob, &read_path, body).await;

    let first_at: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(first["read"]["lastReadAt"].clone()).unwrap();
    let second_at: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(second["read"]["lastReadAt"].clone()).unwrap();
    assert!(second_at >= first_at);
    assert_eq!(second["totalUnread"], 0);
}

#[tokio::test]
async fn test_outsider_cannot_mark_read_or_see_unread() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let mallory = server.user("mallory").await;
    let guild = create_guild(&server, &alice, &[]).await;

    let (status, _) = server
        .post(
            &mallory,
            &format!("/api/channels/{}/read", guild.general_id),
            json!({ "serverId": guild.server_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = server
        .get(&mallory, &format!("/api/servers/{}/unread", guild.server_id))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = server
        .get(&mallory, &format!("/api/notification/server/{}", alice.profile_id))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_general_channel_is_protected() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let guild = create_guild(&server, &alice, &[]).await;
    let path = format!("/api/servers/{}/channels/{}", guild.server_id, guild.general_id);

    let response = server
        .client
        .patch(server.url(&path))
        .bearer_auth(&alice.token)
        .json(&json!({ "name": "lobby" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = server
        .client
        .delete(server.url(&path))
        .bearer_auth(&alice.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_channel_crud_and_duplicate_names() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let guild = create_guild(&server, &alice, &[]).await;
    let channels = format!("/api/servers/{}/channels", guild.server_id);

    let (status, random) = server
        .post(&alice, &channels, json!({ "name": "random", "type": "AUDIO" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(random["type"], "AUDIO");

    let (status, _) = server.post(&alice, &channels, json!({ "name": "random" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let path = format!("{channels}/{}", id(&random["id"]));
    let response = server
        .client
        .delete(server.url(&path))
        .bearer_auth(&alice.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, list) = server.get(&alice, &channels).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_conversation_is_canonical() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;

    let (_, from_alice) = server
        .post(&alice, "/api/conversations", json!({ "otherProfileId": bob.profile_id }))
        .await;
    let (_, from_bob) = server
        .post(&bob, "/api/conversations", json!({ "otherProfileId": alice.profile_id }))
        .await;

    assert_eq!(from_alice["conversation"]["id"], from_bob["conversation"]["id"]);
    assert_eq!(from_alice["otherProfile"]["id"], json!(bob.profile_id));
    assert_eq!(from_bob["otherProfile"]["id"], json!(alice.profile_id));
}

#[tokio::test]
async fn test_fanout_reaches_only_joined_channel() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let carol = server.user("carol").await;
    let guild = create_guild(&server, &alice, &[&bob, &carol]).await;
    let (_, random) = server
        .post(
            &alice,
            &format!("/api/servers/{}/channels", guild.server_id),
            json!({ "name": "random" }),
        )
        .await;
    let random_id = id(&random["id"]);

    let mut alice_ws = server.connect(&alice).await;
    let mut bob_ws = server.connect(&bob).await;
    let mut carol_ws = server.connect(&carol).await;
    join_channel(&mut bob_ws, guild.general_id).await;
    join_channel(&mut carol_ws, random_id).await;

    send(
        &mut alice_ws,
        json!({
            "event": "channel:message:create",
            "data": {
                "tempId": "tmp-1",
                "content": "hello general",
                "channelId": guild.general_id,
                "memberId": guild.owner_member_id,
            }
        }),
    )
    .await;
    // The create is fully processed once alice's own pong comes back
    drain_until_pong(&mut alice_ws).await;

    let message = expect_event(&mut bob_ws, "channel:message").await;
    assert_eq!(message["data"]["tempId"], "tmp-1");
    assert_eq!(message["data"]["message"]["content"], "hello general");
    assert_eq!(message["data"]["message"]["member"]["profile"]["name"], "alice");
    let bob_rest = drain_until_pong(&mut bob_ws).await;
    assert!(bob_rest.iter().all(|e| e["event"] != "channel:notification"));

    let carol_frames = drain_until_pong(&mut carol_ws).await;
    assert!(carol_frames.iter().all(|e| e["event"] != "channel:message"));
    let notification = carol_frames
        .iter()
        .find(|e| e["event"] == "channel:notification")
        .expect("carol should be notified");
    assert_eq!(notification["data"]["channelId"], json!(guild.general_id));
    assert_eq!(notification["data"]["serverId"], json!(guild.server_id));
    assert_eq!(notification["data"]["inc"], 1);
}

#[tokio::test]
async fn test_delete_leaves_tombstone_in_history() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let guild = create_guild(&server, &alice, &[]).await;
    let messages = format!("/api/channels/{}/messages", guild.general_id);

    let (_, created) = server
        .post(
            &alice,
            &messages,
            json!({ "content": "secret", "fileUrl": "https://cdn.test/a.png", "fileType": "img" }),
        )
        .await;
    let message_id = id(&created["id"]);

    let (_, history) = server.get(&alice, &messages).await;
    assert_eq!(history["items"][0]["content"], "secret");
    assert_eq!(history["items"][0]["fileUrl"], "https://cdn.test/a.png");

    let mut ws = server.connect(&alice).await;
    join_channel(&mut ws, guild.general_id).await;
    send(
        &mut ws,
        json!({
            "event": "channel:message:delete",
            "data": { "id": message_id, "channelId": guild.general_id }
        }),
    )
    .await;
    let deleted = expect_event(&mut ws, "channel:message:delete").await;
    assert_eq!(deleted["data"]["id"], json!(message_id));

    let (_, history) = server.get(&alice, &messages).await;
    let item = &history["items"][0];
    assert_eq!(item["deleted"], true);
    assert_eq!(item["content"], "This message has been deleted");
    assert!(item["fileUrl"].is_null());
}

#[tokio::test]
async fn test_leaving_channel_marks_read_but_disconnect_does_not() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let guild = create_guild(&server, &alice, &[&bob]).await;
    let messages = format!("/api/channels/{}/messages", guild.general_id);

    let mut bob_ws = server.connect(&bob).await;
    join_channel(&mut bob_ws, guild.general_id).await;
    server.post(&alice, &messages, json!({ "content": "one" })).await;
    expect_event(&mut bob_ws, "channel:message").await;

    send(
        &mut bob_ws,
        json!({ "event": "channel:leave", "data": { "channelId": guild.general_id } }),
    )
    .await;
    let update = expect_event(&mut bob_ws, "server:unread-update").await;
    assert_eq!(update["data"]["totalUnread"], 0);
    assert_eq!(total_unread(&server, &bob, guild.server_id).await, 0);

    join_channel(&mut bob_ws, guild.general_id).await;
    server.post(&alice, &messages, json!({ "content": "two" })).await;
    expect_event(&mut bob_ws, "channel:message").await;
    bob_ws.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(total_unread(&server, &bob, guild.server_id).await, 1);
}

#[tokio::test]
async fn test_direct_messages_notify_and_track_unread() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let (_, view) = server
        .post(&alice, "/api/conversations", json!({ "otherProfileId": bob.profile_id }))
        .await;
    let conversation_id = id(&view["conversation"]["id"]);

    let mut alice_ws = server.connect(&alice).await;
    let mut bob_ws = server.connect(&bob).await;
    send(
        &mut alice_ws,
        json!({ "event": "conversation:join", "data": { "conversationId": conversation_id } }),
    )
    .await;
    expect_event(&mut alice_ws, "room:joined").await;

    send(
        &mut alice_ws,
        json!({
            "event": "dm:create",
            "data": {
                "tempId": "dm-1",
                "content": "hey bob",
                "conversationId": conversation_id,
                "senderId": alice.profile_id,
            }
        }),
    )
    .await;
    let echoed = expect_event(&mut alice_ws, "dm:create").await;
    assert_eq!(echoed["data"]["tempId"], "dm-1");
    assert_eq!(echoed["data"]["message"]["sender"]["name"], "alice");

    let notification = expect_event(&mut bob_ws, "dm:notification").await;
    assert_eq!(notification["data"]["conversationId"], json!(conversation_id));
    assert_eq!(notification["data"]["senderId"], json!(alice.profile_id));
    assert_eq!(notification["data"]["unread"], 1);

    let (_, unread) = server
        .get(&bob, &format!("/api/notification/conversation/{}", bob.profile_id))
        .await;
    assert_eq!(unread[0]["unread"], 1);

    let (status, _) = server
        .post(&bob, &format!("/api/conversations/{conversation_id}/read"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, unread) = server
        .get(&bob, &format!("/api/notification/conversation/{}", bob.profile_id))
        .await;
    assert_eq!(unread[0]["unread"], 0);

    let (_, history) = server
        .get(&bob, &format!("/api/conversations/{conversation_id}/messages"))
        .await;
    assert_eq!(history["items"][0]["content"], "hey bob");
}

#[tokio::test]
async fn test_dm_errors_carry_temp_id() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let carol = server.user("carol").await;
    let (_, view) = server
        .post(&bob, "/api/conversations", json!({ "otherProfileId": carol.profile_id }))
        .await;
    let conversation_id = id(&view["conversation"]["id"]);

    let mut ws = server.connect(&alice).await;
    send(
        &mut ws,
        json!({
            "event": "dm:create",
            "data": {
                "tempId": "intrude",
                "content": "let me in",
                "conversationId": conversation_id,
                "senderId": alice.profile_id,
            }
        }),
    )
    .await;
    let error = expect_event(&mut ws, "dm:error").await;
    assert_eq!(error["data"]["tempId"], "intrude");
    assert_eq!(error["data"]["kind"], "forbidden");

    send(
        &mut ws,
        json!({
            "event": "dm:create",
            "data": {
                "tempId": "blank",
                "content": "   ",
                "conversationId": conversation_id,
                "senderId": alice.profile_id,
            }
        }),
    )
    .await;
    let error = expect_event(&mut ws, "dm:error").await;
    assert_eq!(error["data"]["tempId"], "blank");
    assert_eq!(error["data"]["kind"], "validation");
}

#[tokio::test]
async fn test_socket_cannot_post_as_another_member() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let guild = create_guild(&server, &alice, &[&bob]).await;

    let mut bob_ws = server.connect(&bob).await;
    send(
        &mut bob_ws,
        json!({
            "event": "channel:message:create",
            "data": {
                "tempId": "spoof",
                "content": "I am alice",
                "channelId": guild.general_id,
                "memberId": guild.owner_member_id,
            }
        }),
    )
    .await;
    let error = expect_event(&mut bob_ws, "channel:error").await;
    assert_eq!(error["data"]["tempId"], "spoof");
    assert_eq!(error["data"]["kind"], "forbidden");

    send(
        &mut bob_ws,
        json!({ "event": "profile:join", "data": { "profileId": alice.profile_id } }),
    )
    .await;
    let error = expect_event(&mut bob_ws, "error").await;
    assert_eq!(error["data"]["kind"], "forbidden");
}

#[tokio::test]
async fn test_socket_requires_a_valid_token() {
    use tokio_tungstenite::tungstenite::Error;

    let server = TestServer::start().await;
    for url in [
        format!("ws://{}/ws", server.addr),
        format!("ws://{}/ws?token=not-a-jwt", server.addr),
    ] {
        match connect_async(url).await {
            Err(Error::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            Err(e) => panic!("unexpected handshake error: {e}"),
            Ok(_) => panic!("socket without a valid token was accepted"),
        }
    }
}

#[tokio::test]
async fn test_guest_socket_cannot_delete_another_members_message() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let guild = create_guild(&server, &alice, &[&bob]).await;
    let messages = format!("/api/channels/{}/messages", guild.general_id);
    let (_, posted) = server.post(&alice, &messages, json!({ "content": "keep me" })).await;
    let message_id = id(&posted["id"]);

    let mut bob_ws = server.connect(&bob).await;
    send(
        &mut bob_ws,
        json!({
            "event": "channel:message:delete",
            "data": { "id": message_id, "channelId": guild.general_id }
        }),
    )
    .await;
    let error = expect_event(&mut bob_ws, "channel:error").await;
    assert_eq!(error["data"]["kind"], "forbidden");

    let (_, history) = server.get(&alice, &messages).await;
    assert_eq!(history["items"][0]["content"], "keep me");
    assert_eq!(history["items"][0]["deleted"], false);
}

#[tokio::test]
async fn test_undecodable_dm_reports_temp_id() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let (_, view) = server
        .post(&alice, "/api/conversations", json!({ "otherProfileId": bob.profile_id }))
        .await;
    let conversation_id = id(&view["conversation"]["id"]);

    let mut ws = server.connect(&alice).await;
    send(
        &mut ws,
        json!({
            "event": "dm:create",
            "data": {
                "tempId": "t-gif",
                "content": "look",
                "fileType": "gif",
                "conversationId": conversation_id,
                "senderId": alice.profile_id,
            }
        }),
    )
    .await;
    let error = expect_event(&mut ws, "dm:error").await;
    assert_eq!(error["data"]["tempId"], "t-gif");
    assert_eq!(error["data"]["kind"], "validation");
}

#[tokio::test]
async fn test_frames_from_one_socket_arrive_in_order() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let guild = create_guild(&server, &alice, &[&bob]).await;

    let mut bob_ws = server.connect(&bob).await;
    join_channel(&mut bob_ws, guild.general_id).await;
    let mut alice_ws = server.connect(&alice).await;

    const COUNT: usize = 25;
    for i in 0..COUNT {
        send(
            &mut alice_ws,
            json!({
                "event": "channel:message:create",
                "data": {
                    "tempId": format!("t{i}"),
                    "content": format!("m{i}"),
                    "channelId": guild.general_id,
                    "memberId": guild.owner_member_id,
                }
            }),
        )
        .await;
    }

    for i in 0..COUNT {
        let message = expect_event(&mut bob_ws, "channel:message").await;
        assert_eq!(message["data"]["message"]["content"], format!("m{i}"));
    }
}

#[tokio::test]
async fn test_server_management_rights() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    let carol = server.user("carol").await;
    let guild = create_guild(&server, &alice, &[&bob, &carol]).await;
    let base = format!("/api/servers/{}", guild.server_id);

    let (status, _) = server.patch(&bob, &base, json!({ "name": "Mine now" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(server.delete(&bob, &base).await, StatusCode::FORBIDDEN);

    let (status, _) = server.post(&alice, &format!("{base}/leave"), json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, bob_view) = server.get(&bob, "/api/servers").await;
    let bob_member = id(&bob_view["data"][0]["memberId"]);
    let (_, carol_view) = server.get(&carol, "/api/servers").await;
    let carol_member = id(&carol_view["data"][0]["memberId"]);

    let (status, _) = server
        .patch(&bob, &format!("{base}/members/{carol_member}"), json!({ "role": "VICE_OWNER" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, promoted) = server
        .patch(&alice, &format!("{base}/members/{bob_member}"), json!({ "role": "VICE_OWNER" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["role"], "VICE_OWNER");

    let (status, _) = server
        .patch(&bob, &format!("{base}/members/{}", guild.owner_member_id), json!({ "role": "GUEST" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(
        server.delete(&bob, &format!("{base}/members/{carol_member}")).await,
        StatusCode::NO_CONTENT
    );
    let (_, carol_view) = server.get(&carol, "/api/servers").await;
    assert_eq!(carol_view["total"], 0);

    let (status, _) = server.post(&bob, &format!("{base}/leave"), json!({})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, renamed) = server.patch(&alice, &base, json!({ "name": "Ferris" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Ferris");
    assert_eq!(server.delete(&alice, &base).await, StatusCode::NO_CONTENT);
    let (_, listing) = server.get(&alice, "/api/servers?skip=0&limit=5").await;
    assert_eq!(listing["total"], 0);
    assert_eq!(listing["limit"], 5);
}

#[tokio::test]
async fn test_malformed_frame_gets_error_event() {
    let server = TestServer::start().await;
    let alice = server.user("alice").await;
    let mut ws = server.connect(&alice).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    let error = expect_event(&mut ws, "error").await;
    assert_eq!(error["data"]["kind"], "validation");

    // The connection survives
    assert!(drain_until_pong(&mut ws).await.is_empty());
}

#[tokio::test]
async fn test_relay_delivers_across_instances() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let bus = RelayBus::default();
    let east = TestServer::start_with(store.clone(), Arc::new(RelayHub::new(bus.clone()))).await;
    let west = TestServer::start_with(store, Arc::new(RelayHub::new(bus))).await;

    let alice = east.user("alice").await;
    let bob = west.user("bob").await;
    let carol = west.user("carol").await;
    let guild = create_guild(&east, &alice, &[&bob, &carol]).await;

    let mut bob_ws = west.connect(&bob).await;
    let mut carol_ws = west.connect(&carol).await;
    join_channel(&mut bob_ws, guild.general_id).await;

    east.post(
        &alice,
        &format!("/api/channels/{}/messages", guild.general_id),
        json!({ "content": "across the bus" }),
    )
    .await;

    let message = expect_event(&mut bob_ws, "channel:message").await;
    assert_eq!(message["data"]["message"]["content"], "across the bus");
    let notification = expect_event(&mut carol_ws, "channel:notification").await;
    assert_eq!(notification["data"]["channelId"], json!(guild.general_id));
}
