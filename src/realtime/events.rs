//! Unified server event system.
//!
//! Every real-time payload pushed to a client is one of these variants. The
//! set is closed on purpose: each event kind has exactly one audience rule
//! (applied by the dispatch surface), so routing is enumerable and testable
//! instead of an open string namespace.
//!
//! Wire structure is flat, tagged by "type" with an added timestamp:
//! ```json
//! {
//!     "type": "message.new",
//!     "timestamp": "2025-10-26T10:30:00Z",
//!     "chat_id": "uuid",
//!     ...
//! }
//! ```

use crate::models::{ChatPreview, FriendRequest, NotificationSettings};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// New message in a chat. The sender's own connections receive a copy
    /// with `is_from_caller` set, everyone else gets it unset.
    #[serde(rename = "message.new")]
    MessageNew {
        message_id: Uuid,
        chat_id: Uuid,
        sender_id: Uuid,
        content: String,
        is_from_caller: bool,
    },

    /// Read-mark ack, delivered to the acting user's own connection only.
    #[serde(rename = "message.read")]
    MessageRead { chat_id: Uuid, user_id: Uuid },

    #[serde(rename = "typing.started")]
    TypingStarted { chat_id: Uuid, user_id: Uuid },

    #[serde(rename = "typing.stopped")]
    TypingStopped { chat_id: Uuid, user_id: Uuid },

    #[serde(rename = "chat.created")]
    ChatCreated {
        chat_id: Uuid,
        name: Option<String>,
        member_ids: Vec<Uuid>,
    },

    #[serde(rename = "chat.member_added")]
    MemberAdded { chat_id: Uuid, user_id: Uuid },

    #[serde(rename = "chat.member_left")]
    MemberLeft { chat_id: Uuid, user_id: Uuid },

    /// Delivered to the target user only; silently skipped when offline.
    #[serde(rename = "friend.request")]
    FriendRequestReceived { request_id: Uuid, from_user_id: Uuid },

    /// Delivered to the original requester.
    #[serde(rename = "friend.accepted")]
    FriendRequestAccepted { request_id: Uuid, by_user_id: Uuid },

    /// Ack to the acting user; the blocked party is never notified.
    #[serde(rename = "block.toggled")]
    BlockToggled { target_user_id: Uuid, blocked: bool },

    #[serde(rename = "profile.updated")]
    ProfileUpdated {
        user_id: Uuid,
        username: String,
        avatar_url: Option<String>,
    },

    #[serde(rename = "settings.updated")]
    SettingsUpdated {
        sounds_enabled: bool,
        previews_enabled: bool,
    },

    /// Online/offline transition, broadcast to the user's social audience.
    #[serde(rename = "presence.updated")]
    StatusUpdate { user_id: Uuid, is_online: bool },

    /// Initial state, pushed to a freshly connected client only.
    #[serde(rename = "session.snapshot")]
    Snapshot {
        chats: Vec<ChatPreview>,
        pending_requests: Vec<FriendRequest>,
        settings: NotificationSettings,
        blocked: Vec<Uuid>,
    },

    /// Mutation-path failure echoed back to the issuing connection.
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    /// Get event type as string (e.g., "message.new")
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageNew { .. } => "message.new",
            Self::MessageRead { .. } => "message.read",
            Self::TypingStarted { .. } => "typing.started",
            Self::TypingStopped { .. } => "typing.stopped",
            Self::ChatCreated { .. } => "chat.created",
            Self::MemberAdded { .. } => "chat.member_added",
            Self::MemberLeft { .. } => "chat.member_left",
            Self::FriendRequestReceived { .. } => "friend.request",
            Self::FriendRequestAccepted { .. } => "friend.accepted",
            Self::BlockToggled { .. } => "block.toggled",
            Self::ProfileUpdated { .. } => "profile.updated",
            Self::SettingsUpdated { .. } => "settings.updated",
            Self::StatusUpdate { .. } => "presence.updated",
            Self::Snapshot { .. } => "session.snapshot",
            Self::Error { .. } => "error",
        }
    }

    /// Flat JSON value with `type` (serde tag) plus `timestamp`. This is
    /// the only place event serialization happens; handlers never build
    /// payload JSON by hand.
    pub fn to_payload_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert(
                "timestamp".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }
        Ok(value)
    }

    /// Serialized wire form.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        let value = self.to_payload_value()?;
        serde_json::to_string(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_serde_tag() {
        let chat_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let event = ServerEvent::TypingStarted { chat_id, user_id };

        assert_eq!(event.event_type(), "typing.started");

        let payload = event.to_payload().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["type"], "typing.started");
    }

    #[test]
    fn payload_is_flat_with_timestamp() {
        let event = ServerEvent::MessageNew {
            message_id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hi".into(),
            is_from_caller: false,
        };

        let parsed: serde_json::Value =
            serde_json::from_str(&event.to_payload().unwrap()).unwrap();
        assert_eq!(parsed["type"], "message.new");
        assert_eq!(parsed["content"], "hi");
        assert_eq!(parsed["is_from_caller"], false);
        assert!(parsed["timestamp"].is_string());
        // No nested "data" object: event fields sit at the top level
        assert!(parsed.get("data").is_none());
    }

    #[test]
    fn presence_event_round_trips() {
        let user_id = Uuid::new_v4();
        let event = ServerEvent::StatusUpdate {
            user_id,
            is_online: true,
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&event.to_payload().unwrap()).unwrap();
        assert_eq!(parsed["type"], "presence.updated");
        assert_eq!(parsed["user_id"], user_id.to_string());
        assert_eq!(parsed["is_online"], true);
    }
}
