use chat_realtime_service::config::Config;
use chat_realtime_service::realtime::{ConnectionRegistry, FanoutRouter};
use chat_realtime_service::routes::build_router;
use chat_realtime_service::state::AppState;
use chat_realtime_service::storage::{MemoryStorage, Storage};
use futures_util::StreamExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::Arc;
use uuid::Uuid;

async fn spawn_server() -> (String, MemoryStorage) {
    let storage = MemoryStorage::new();
    let shared: Arc<dyn Storage> = Arc::new(storage.clone());
    let registry = ConnectionRegistry::new();
    let fanout = FanoutRouter::new(registry.clone());
    let state = AppState::new(shared, registry, fanout, Config::test_defaults());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    (format!("127.0.0.1:{}", addr.port()), storage)
}

fn issue_token(user_id: Uuid) -> String {
    #[derive(serde::Serialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }
    let claims = Claims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(Config::test_defaults().jwt_secret.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let (addr, _storage) = spawn_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn snapshot_requires_a_bearer_token() {
    let (addr, storage) = spawn_server().await;
    let alice = storage.add_user("alice").await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/v1/snapshot");

    let anonymous = client.get(&url).send().await.unwrap();
    assert_eq!(anonymous.status(), 401);

    let authed = client
        .get(&url)
        .bearer_auth(issue_token(alice.id))
        .send()
        .await
        .unwrap();
    assert_eq!(authed.status(), 200);
    let body: serde_json::Value = authed.json().await.unwrap();
    assert!(body["chats"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn websocket_handshake_rejects_missing_and_bad_tokens() {
    let (addr, _storage) = spawn_server().await;

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/api/v1/ws"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(ref resp) if resp.status() == 401
    ));

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/api/v1/ws?token=garbage"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        tokio_tungstenite::tungstenite::Error::Http(ref resp) if resp.status() == 401
    ));
}

#[tokio::test]
async fn websocket_session_pushes_the_snapshot_on_connect() {
    let (addr, storage) = spawn_server().await;
    let alice = storage.add_user("alice").await;
    let bob = storage.add_user("bob").await;
    storage
        .create_chat(bob.id, Some("general"), &[alice.id, bob.id])
        .await
        .unwrap();

    let url = format!("ws://{addr}/api/v1/ws?token={}", issue_token(alice.id));
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    let frame = ws.next().await.unwrap().unwrap();
    let event: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(event["type"], "session.snapshot");
    assert_eq!(event["chats"].as_array().unwrap().len(), 1);
    assert_eq!(event["chats"][0]["name"], "general");
}
