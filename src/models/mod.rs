use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub name: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "accepted" => Self::Accepted,
            "declined" => Self::Declined,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub user_id: Uuid,
    pub sounds_enabled: bool,
    pub previews_enabled: bool,
}

impl NotificationSettings {
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            sounds_enabled: true,
            previews_enabled: true,
        }
    }
}

/// Client metadata attached to a live connection. Parsed upstream (edge /
/// user-agent parser); the core only carries it for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub device: Option<String>,
}

/// One chat as shown in the initial snapshot: identity, last message and
/// how many messages arrived after the user's last read mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPreview {
    pub chat_id: Uuid,
    pub name: Option<String>,
    pub last_message: Option<String>,
    pub unread_count: i64,
}

/// Initial state pushed to a freshly connected client, and re-fetchable over
/// HTTP when a client suspects it is out of sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub chats: Vec<ChatPreview>,
    pub pending_requests: Vec<FriendRequest>,
    pub settings: NotificationSettings,
    pub blocked: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_status_survives_the_column_round_trip() {
        for status in [
            FriendRequestStatus::Pending,
            FriendRequestStatus::Accepted,
            FriendRequestStatus::Declined,
        ] {
            assert_eq!(FriendRequestStatus::parse(status.as_str()), status);
        }
        // unknown column values degrade to pending rather than failing a read
        assert_eq!(
            FriendRequestStatus::parse("garbage"),
            FriendRequestStatus::Pending
        );
    }
}
