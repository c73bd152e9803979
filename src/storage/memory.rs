//! In-memory storage backend.
//!
//! Backs the integration tests and single-binary development mode. Keeps the
//! same semantics as the Postgres backend (symmetric friendship rows,
//! read-mark based unread counts) so the core behaves identically over both.

use crate::error::{AppError, AppResult};
use crate::models::{
    Chat, ChatPreview, FriendRequest, FriendRequestStatus, Message, NotificationSettings,
    SessionSnapshot, User,
};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    chats: HashMap<Uuid, Chat>,
    chat_members: HashMap<Uuid, Vec<Uuid>>,
    messages: Vec<Message>,
    read_marks: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    friendships: HashSet<(Uuid, Uuid)>,
    requests: HashMap<Uuid, FriendRequest>,
    blocks: HashSet<(Uuid, Uuid)>,
    settings: HashMap<Uuid, NotificationSettings>,
}

#[derive(Default, Clone)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user (test fixture; users are owned by an external identity
    /// service in production).
    pub async fn add_user(&self, username: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            avatar_url: None,
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .await
            .users
            .insert(user.id, user.clone());
        user
    }

    /// Seed an established friendship (both directions).
    pub async fn befriend(&self, a: Uuid, b: Uuid) {
        let mut inner = self.inner.write().await;
        inner.friendships.insert((a, b));
        inner.friendships.insert((b, a));
    }

    pub async fn message_count(&self, chat_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .count()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn user_exists(&self, user_id: Uuid) -> AppResult<bool> {
        Ok(self.inner.read().await.users.contains_key(&user_id))
    }

    async fn chat_exists(&self, chat_id: Uuid) -> AppResult<bool> {
        Ok(self.inner.read().await.chats.contains_key(&chat_id))
    }

    async fn chat_members(&self, chat_id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .inner
            .read()
            .await
            .chat_members
            .get(&chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_chat_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        Ok(self
            .inner
            .read()
            .await
            .chat_members
            .get(&chat_id)
            .is_some_and(|m| m.contains(&user_id)))
    }

    async fn friends_of(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .inner
            .read()
            .await
            .friendships
            .iter()
            .filter(|(a, _)| *a == user_id)
            .map(|(_, b)| *b)
            .collect())
    }

    async fn presence_audience(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.read().await;
        let mut audience: HashSet<Uuid> = inner
            .friendships
            .iter()
            .filter(|(a, _)| *a == user_id)
            .map(|(_, b)| *b)
            .collect();
        for members in inner.chat_members.values() {
            if members.contains(&user_id) {
                audience.extend(members.iter().copied());
            }
        }
        audience.remove(&user_id);
        Ok(audience.into_iter().collect())
    }

    async fn is_blocked(&self, blocker: Uuid, target: Uuid) -> AppResult<bool> {
        Ok(self.inner.read().await.blocks.contains(&(blocker, target)))
    }

    async fn create_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            chat_id,
            sender_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.inner.write().await.messages.push(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.inner
            .write()
            .await
            .read_marks
            .insert((chat_id, user_id), Utc::now());
        Ok(())
    }

    async fn create_chat(
        &self,
        creator: Uuid,
        name: Option<&str>,
        member_ids: &[Uuid],
    ) -> AppResult<Chat> {
        let chat = Chat {
            id: Uuid::new_v4(),
            name: name.map(|s| s.to_string()),
            created_by: creator,
            created_at: Utc::now(),
        };
        let mut members: Vec<Uuid> = Vec::new();
        for id in member_ids {
            if !members.contains(id) {
                members.push(*id);
            }
        }
        let mut inner = self.inner.write().await;
        inner.chats.insert(chat.id, chat.clone());
        inner.chat_members.insert(chat.id, members);
        Ok(chat)
    }

    async fn add_chat_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let members = inner.chat_members.entry(chat_id).or_default();
        if !members.contains(&user_id) {
            members.push(user_id);
        }
        Ok(())
    }

    async fn remove_chat_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        if let Some(members) = inner.chat_members.get_mut(&chat_id) {
            let before = members.len();
            members.retain(|m| *m != user_id);
            return Ok(members.len() != before);
        }
        Ok(false)
    }

    async fn create_friend_request(&self, from: Uuid, to: Uuid) -> AppResult<FriendRequest> {
        let request = FriendRequest {
            id: Uuid::new_v4(),
            from_user_id: from,
            to_user_id: to,
            status: FriendRequestStatus::Pending,
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .await
            .requests
            .insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_friend_request(&self, request_id: Uuid) -> AppResult<Option<FriendRequest>> {
        Ok(self.inner.read().await.requests.get(&request_id).cloned())
    }

    async fn accept_friend_request(&self, request_id: Uuid) -> AppResult<FriendRequest> {
        let mut inner = self.inner.write().await;
        let request = inner
            .requests
            .get_mut(&request_id)
            .ok_or(AppError::NotFound)?;
        request.status = FriendRequestStatus::Accepted;
        let request = request.clone();
        inner
            .friendships
            .insert((request.from_user_id, request.to_user_id));
        inner
            .friendships
            .insert((request.to_user_id, request.from_user_id));
        Ok(request)
    }

    async fn decline_friend_request(&self, request_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let request = inner
            .requests
            .get_mut(&request_id)
            .ok_or(AppError::NotFound)?;
        request.status = FriendRequestStatus::Declined;
        Ok(())
    }

    async fn set_block(&self, blocker: Uuid, target: Uuid, blocked: bool) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if blocked {
            inner.blocks.insert((blocker, target));
        } else {
            inner.blocks.remove(&(blocker, target));
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        username: Option<&str>,
        avatar_url: Option<&str>,
    ) -> AppResult<User> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        if let Some(name) = username {
            user.username = name.to_string();
        }
        if let Some(url) = avatar_url {
            user.avatar_url = Some(url.to_string());
        }
        Ok(user.clone())
    }

    async fn update_settings(&self, settings: &NotificationSettings) -> AppResult<()> {
        self.inner
            .write()
            .await
            .settings
            .insert(settings.user_id, settings.clone());
        Ok(())
    }

    async fn snapshot(&self, user_id: Uuid) -> AppResult<SessionSnapshot> {
        let inner = self.inner.read().await;
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_else(Utc::now);

        let mut chats: Vec<ChatPreview> = Vec::new();
        for (chat_id, members) in &inner.chat_members {
            if !members.contains(&user_id) {
                continue;
            }
            let chat = match inner.chats.get(chat_id) {
                Some(c) => c,
                None => continue,
            };
            let last_read = inner
                .read_marks
                .get(&(*chat_id, user_id))
                .copied()
                .unwrap_or(epoch);
            let mut last_message = None;
            let mut unread_count = 0i64;
            for m in inner.messages.iter().filter(|m| m.chat_id == *chat_id) {
                last_message = Some(m.content.clone());
                if m.sender_id != user_id && m.created_at > last_read {
                    unread_count += 1;
                }
            }
            chats.push(ChatPreview {
                chat_id: *chat_id,
                name: chat.name.clone(),
                last_message,
                unread_count,
            });
        }
        chats.sort_by_key(|p| p.chat_id);

        let mut pending_requests: Vec<FriendRequest> = inner
            .requests
            .values()
            .filter(|r| r.to_user_id == user_id && r.status == FriendRequestStatus::Pending)
            .cloned()
            .collect();
        pending_requests.sort_by_key(|r| r.created_at);

        let settings = inner
            .settings
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| NotificationSettings::defaults_for(user_id));

        let blocked = inner
            .blocks
            .iter()
            .filter(|(b, _)| *b == user_id)
            .map(|(_, t)| *t)
            .collect();

        Ok(SessionSnapshot {
            chats,
            pending_requests,
            settings,
            blocked,
        })
    }
}
