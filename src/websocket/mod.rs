//! WebSocket transport: handshake authentication, the inbound client
//! protocol, and the per-connection read/write loop.
//!
//! The transport owns nothing but plumbing. Identity is resolved before the
//! upgrade completes; lifecycle belongs to the session coordinator; every
//! inbound frame is routed through the dispatch surface; outbound frames
//! drain the connection's own queue so per-connection order is preserved.

use crate::error::AppError;
use crate::middleware::auth::{user_id_from_claims, verify_jwt};
use crate::models::ClientInfo;
use crate::realtime::{ConnectionRecord, ServerEvent};
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Inbound client frames, tagged the same way as server events.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "message.send")]
    SendMessage { chat_id: Uuid, content: String },

    #[serde(rename = "message.read")]
    MarkRead { chat_id: Uuid },

    #[serde(rename = "typing.start")]
    TypingStart { chat_id: Uuid },

    #[serde(rename = "typing.stop")]
    TypingStop { chat_id: Uuid },

    #[serde(rename = "chat.create")]
    CreateChat {
        name: Option<String>,
        member_ids: Vec<Uuid>,
    },

    #[serde(rename = "chat.add_member")]
    AddMember { chat_id: Uuid, user_id: Uuid },

    #[serde(rename = "chat.leave")]
    LeaveChat { chat_id: Uuid },

    #[serde(rename = "friend.request")]
    SendFriendRequest { user_id: Uuid },

    #[serde(rename = "friend.accept")]
    AcceptFriendRequest { request_id: Uuid },

    #[serde(rename = "friend.decline")]
    DeclineFriendRequest { request_id: Uuid },

    #[serde(rename = "block.toggle")]
    ToggleBlock { user_id: Uuid },

    #[serde(rename = "profile.update")]
    UpdateProfile {
        username: Option<String>,
        avatar_url: Option<String>,
    },

    #[serde(rename = "settings.update")]
    UpdateSettings {
        sounds_enabled: bool,
        previews_enabled: bool,
    },
}

fn token_from(params: &WsParams, headers: &HeaderMap) -> Option<String> {
    params.token.clone().or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    })
}

fn client_info_from(headers: &HeaderMap) -> ClientInfo {
    ClientInfo {
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        device: headers
            .get("x-device-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
    }
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // A connection without a resolvable identity is refused before upgrade;
    // nothing downstream ever sees an anonymous socket.
    let Some(token) = token_from(&params, &headers) else {
        warn!("websocket handshake rejected: no token");
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    };
    let user_id = match verify_jwt(&token, &state.config.jwt_secret)
        .and_then(|claims| user_id_from_claims(&claims))
    {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "websocket handshake rejected: invalid token");
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let client = client_info_from(&headers);
    ws.on_upgrade(move |socket| handle_socket(state, socket, user_id, client))
}

async fn handle_socket(state: AppState, socket: WebSocket, user_id: Uuid, client: ClientInfo) {
    let (record, mut rx) = ConnectionRecord::new(user_id, client);
    let connection_id = record.connection_id;

    // The registry now holds the only sender for our queue. When a
    // reconnect supersedes this record the registry drops it, the queue
    // closes, and the loop below tears the old transport down.
    if let Err(e) = state.sessions.on_connect(record).await {
        warn!(%user_id, error = %e, "session setup failed");
    }

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            // Outbound: drain this connection's queue in order.
            queued = rx.recv() => {
                match queued {
                    Some(msg) => {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    // Superseded by a reconnect: the registry dropped the
                    // last sender.
                    None => break,
                }
            }

            // Inbound: client frames routed through the dispatcher.
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(payload) = handle_client_frame(&state, user_id, &text).await {
                            if sink.send(Message::Text(payload)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                }
            }
        }
    }

    state.sessions.on_disconnect(user_id, connection_id).await;
}

/// Parse and dispatch one inbound frame. Failures never tear the connection
/// down; they come back as a serialized error event for the caller and the
/// loop continues.
async fn handle_client_frame(state: &AppState, user_id: Uuid, text: &str) -> Option<String> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(%user_id, error = %e, "unparseable client frame");
            return error_payload(&AppError::BadRequest("unrecognized event".into()));
        }
    };

    match dispatch_client_event(state, user_id, event).await {
        Ok(()) => None,
        Err(e) => error_payload(&e),
    }
}

async fn dispatch_client_event(
    state: &AppState,
    user_id: Uuid,
    event: ClientEvent,
) -> Result<(), AppError> {
    let d = &state.dispatcher;
    match event {
        ClientEvent::SendMessage { chat_id, content } => {
            d.send_message(user_id, chat_id, &content).await?;
        }
        ClientEvent::MarkRead { chat_id } => d.mark_read(user_id, chat_id).await?,
        ClientEvent::TypingStart { chat_id } => d.typing(user_id, chat_id, true).await?,
        ClientEvent::TypingStop { chat_id } => d.typing(user_id, chat_id, false).await?,
        ClientEvent::CreateChat { name, member_ids } => {
            d.create_chat(user_id, name.as_deref(), &member_ids).await?;
        }
        ClientEvent::AddMember {
            chat_id,
            user_id: member,
        } => d.add_member(user_id, chat_id, member).await?,
        ClientEvent::LeaveChat { chat_id } => d.leave_chat(user_id, chat_id).await?,
        ClientEvent::SendFriendRequest { user_id: target } => {
            d.send_friend_request(user_id, target).await?;
        }
        ClientEvent::AcceptFriendRequest { request_id } => {
            d.accept_friend_request(user_id, request_id).await?;
        }
        ClientEvent::DeclineFriendRequest { request_id } => {
            d.decline_friend_request(user_id, request_id).await?;
        }
        ClientEvent::ToggleBlock { user_id: target } => {
            d.toggle_block(user_id, target).await?;
        }
        ClientEvent::UpdateProfile {
            username,
            avatar_url,
        } => {
            d.update_profile(user_id, username.as_deref(), avatar_url.as_deref())
                .await?;
        }
        ClientEvent::UpdateSettings {
            sounds_enabled,
            previews_enabled,
        } => {
            d.update_settings(user_id, sounds_enabled, previews_enabled)
                .await?;
        }
    }
    Ok(())
}

fn error_payload(error: &AppError) -> Option<String> {
    let event = ServerEvent::Error {
        code: error.code().to_string(),
        message: error.to_string(),
    };
    match event.to_payload() {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(error = %e, "error event serialization failed");
            None
        }
    }
}
