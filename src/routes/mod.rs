use crate::error::AppResult;
use crate::middleware::guards::AuthedUser;
use crate::state::AppState;
use axum::{extract::State, middleware, routing::get, Json, Router};
use serde_json::json;

async fn metrics(State(state): State<AppState>) -> String {
    json!({
        "service": "chat-realtime-service",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "connections": state.registry.connection_count().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
    .to_string()
}

/// HTTP fallback for the initial state push: the same snapshot a fresh
/// websocket connection receives, for clients that missed or dropped it.
async fn snapshot(
    State(state): State<AppState>,
    AuthedUser { id }: AuthedUser,
) -> AppResult<Json<serde_json::Value>> {
    let snapshot = state.storage.snapshot(id).await?;
    Ok(Json(json!({
        "chats": snapshot.chats,
        "pending_requests": snapshot.pending_requests,
        "settings": snapshot.settings,
        "blocked": snapshot.blocked,
    })))
}

pub fn build_router(state: AppState) -> Router {
    // Service introspection endpoints (no API version prefix)
    let introspection = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(metrics));

    let api_v1 = Router::new()
        .route("/snapshot", get(snapshot))
        .route("/ws", get(crate::websocket::ws_handler));

    // Auth applies to API v1 only; introspection stays public for
    // healthchecks. The websocket handshake is exempted inside the
    // middleware and validates its own token.
    let secured_api_v1 = api_v1.layer(middleware::from_fn_with_state(
        state.clone(),
        crate::middleware::auth::auth_middleware,
    ));

    let router = introspection.merge(Router::new().nest("/api/v1", secured_api_v1));

    crate::middleware::with_defaults(router).with_state(state)
}
