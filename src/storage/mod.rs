//! Durable storage collaborator.
//!
//! The real-time core never touches tables directly; everything it needs
//! from durable state goes through this trait. `postgres` is the production
//! backend, `memory` backs tests and single-binary development.

use crate::error::AppResult;
use crate::models::{Chat, FriendRequest, Message, NotificationSettings, SessionSnapshot, User};
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    // --- reads used for audience resolution -------------------------------

    async fn user_exists(&self, user_id: Uuid) -> AppResult<bool>;
    async fn chat_exists(&self, chat_id: Uuid) -> AppResult<bool>;
    async fn chat_members(&self, chat_id: Uuid) -> AppResult<Vec<Uuid>>;
    async fn is_chat_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<bool>;
    async fn friends_of(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Everyone who should observe this user's presence: friends plus
    /// co-members of any shared chat, deduplicated, excluding the user.
    async fn presence_audience(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Has `blocker` blocked `target`?
    async fn is_blocked(&self, blocker: Uuid, target: Uuid) -> AppResult<bool>;

    // --- domain mutations -------------------------------------------------

    async fn create_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<Message>;

    /// Move the caller's read mark in a chat to now.
    async fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<()>;

    /// Create a chat with the given members (the creator is always one).
    async fn create_chat(
        &self,
        creator: Uuid,
        name: Option<&str>,
        member_ids: &[Uuid],
    ) -> AppResult<Chat>;

    async fn add_chat_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<()>;

    /// Returns false when the user was not a member.
    async fn remove_chat_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<bool>;

    async fn create_friend_request(&self, from: Uuid, to: Uuid) -> AppResult<FriendRequest>;
    async fn get_friend_request(&self, request_id: Uuid) -> AppResult<Option<FriendRequest>>;

    /// Mark the request accepted and create the symmetric friendship rows.
    async fn accept_friend_request(&self, request_id: Uuid) -> AppResult<FriendRequest>;
    async fn decline_friend_request(&self, request_id: Uuid) -> AppResult<()>;

    async fn set_block(&self, blocker: Uuid, target: Uuid, blocked: bool) -> AppResult<()>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        username: Option<&str>,
        avatar_url: Option<&str>,
    ) -> AppResult<User>;

    async fn update_settings(&self, settings: &NotificationSettings) -> AppResult<()>;

    // --- snapshot ---------------------------------------------------------

    /// Everything a freshly connected client needs: chat previews with
    /// unread counts, pending friend requests, settings, blocked list.
    async fn snapshot(&self, user_id: Uuid) -> AppResult<SessionSnapshot>;
}
