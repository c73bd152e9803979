//! Event dispatch surface: one method per inbound real-time operation.
//!
//! Every operation follows the same shape: guard (identity is already
//! resolved by the transport; membership/permission checks happen here),
//! mutate durable state, compute the audience, fan out. A mutation failure
//! aborts before any fan-out so no partial event ever leaks; a fan-out
//! failure after a committed mutation is logged and swallowed because the
//! durable state is the source of truth and clients self-correct from the
//! next snapshot.

use crate::error::{AppError, AppResult};
use crate::models::{Chat, FriendRequest, Message, NotificationSettings, User};
use crate::realtime::events::ServerEvent;
use crate::realtime::fanout::{DeliveryReport, FanoutRouter};
use crate::storage::Storage;
use std::sync::Arc;
use uuid::Uuid;

pub struct Dispatcher {
    storage: Arc<dyn Storage>,
    fanout: FanoutRouter,
}

impl Dispatcher {
    pub fn new(storage: Arc<dyn Storage>, fanout: FanoutRouter) -> Self {
        Self { storage, fanout }
    }

    /// Send a message to a chat. The sender's own connection receives an
    /// echo flagged `is_from_caller`; everyone else gets the plain copy.
    pub async fn send_message(
        &self,
        caller: Uuid,
        chat_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("message content is empty".into()));
        }
        if !self.storage.chat_exists(chat_id).await? {
            return Err(AppError::NotFound);
        }
        if !self.storage.is_chat_member(chat_id, caller).await? {
            return Err(AppError::Forbidden);
        }

        let message = self.storage.create_message(chat_id, caller, content).await?;
        let members = self.storage.chat_members(chat_id).await?;

        let own_copy = ServerEvent::MessageNew {
            message_id: message.id,
            chat_id,
            sender_id: caller,
            content: message.content.clone(),
            is_from_caller: true,
        };
        self.fanout.deliver(&[caller], &own_copy, None).await;

        let broadcast = ServerEvent::MessageNew {
            message_id: message.id,
            chat_id,
            sender_id: caller,
            content: message.content.clone(),
            is_from_caller: false,
        };
        let report = self.fanout.deliver(&members, &broadcast, Some(caller)).await;
        log_report("message.new", &report);

        Ok(message)
    }

    /// Move the caller's read mark; ack goes to the caller's connection only.
    pub async fn mark_read(&self, caller: Uuid, chat_id: Uuid) -> AppResult<()> {
        if !self.storage.chat_exists(chat_id).await? {
            return Err(AppError::NotFound);
        }
        if !self.storage.is_chat_member(chat_id, caller).await? {
            return Err(AppError::Forbidden);
        }

        self.storage.mark_read(chat_id, caller).await?;

        let ack = ServerEvent::MessageRead {
            chat_id,
            user_id: caller,
        };
        self.fanout.deliver(&[caller], &ack, None).await;
        Ok(())
    }

    /// Typing indicator: ephemeral, never persisted, sender excluded.
    pub async fn typing(&self, caller: Uuid, chat_id: Uuid, started: bool) -> AppResult<()> {
        if !self.storage.chat_exists(chat_id).await? {
            return Err(AppError::NotFound);
        }
        if !self.storage.is_chat_member(chat_id, caller).await? {
            return Err(AppError::Forbidden);
        }

        let members = self.storage.chat_members(chat_id).await?;
        let event = if started {
            ServerEvent::TypingStarted {
                chat_id,
                user_id: caller,
            }
        } else {
            ServerEvent::TypingStopped {
                chat_id,
                user_id: caller,
            }
        };
        let report = self.fanout.deliver(&members, &event, Some(caller)).await;
        log_report(event.event_type(), &report);
        Ok(())
    }

    /// Create a chat; every member (creator included) is notified after the
    /// chat row committed.
    pub async fn create_chat(
        &self,
        caller: Uuid,
        name: Option<&str>,
        member_ids: &[Uuid],
    ) -> AppResult<Chat> {
        let mut members = member_ids.to_vec();
        if !members.contains(&caller) {
            members.push(caller);
        }
        for member in &members {
            if !self.storage.user_exists(*member).await? {
                return Err(AppError::NotFound);
            }
        }

        let chat = self.storage.create_chat(caller, name, &members).await?;

        let event = ServerEvent::ChatCreated {
            chat_id: chat.id,
            name: chat.name.clone(),
            member_ids: members.clone(),
        };
        let report = self.fanout.deliver(&members, &event, None).await;
        log_report("chat.created", &report);

        Ok(chat)
    }

    pub async fn add_member(&self, caller: Uuid, chat_id: Uuid, user_id: Uuid) -> AppResult<()> {
        if !self.storage.chat_exists(chat_id).await? || !self.storage.user_exists(user_id).await? {
            return Err(AppError::NotFound);
        }
        if !self.storage.is_chat_member(chat_id, caller).await? {
            return Err(AppError::Forbidden);
        }

        self.storage.add_chat_member(chat_id, user_id).await?;
        let members = self.storage.chat_members(chat_id).await?;

        let event = ServerEvent::MemberAdded { chat_id, user_id };
        let report = self.fanout.deliver(&members, &event, None).await;
        log_report("chat.member_added", &report);
        Ok(())
    }

    pub async fn leave_chat(&self, caller: Uuid, chat_id: Uuid) -> AppResult<()> {
        if !self.storage.chat_exists(chat_id).await? {
            return Err(AppError::NotFound);
        }

        let removed = self.storage.remove_chat_member(chat_id, caller).await?;
        if !removed {
            return Err(AppError::NotFound);
        }

        // Remaining members plus the leaver's own ack
        let mut audience = self.storage.chat_members(chat_id).await?;
        audience.push(caller);

        let event = ServerEvent::MemberLeft {
            chat_id,
            user_id: caller,
        };
        let report = self.fanout.deliver(&audience, &event, None).await;
        log_report("chat.member_left", &report);
        Ok(())
    }

    /// The request row is durable regardless of the target being online;
    /// delivery to an offline target is silently skipped.
    pub async fn send_friend_request(&self, caller: Uuid, to: Uuid) -> AppResult<FriendRequest> {
        if to == caller {
            return Err(AppError::BadRequest("cannot befriend yourself".into()));
        }
        if !self.storage.user_exists(to).await? {
            return Err(AppError::NotFound);
        }
        if self.storage.is_blocked(caller, to).await? || self.storage.is_blocked(to, caller).await?
        {
            return Err(AppError::Forbidden);
        }

        let request = self.storage.create_friend_request(caller, to).await?;

        let event = ServerEvent::FriendRequestReceived {
            request_id: request.id,
            from_user_id: caller,
        };
        let report = self.fanout.deliver(&[to], &event, None).await;
        log_report("friend.request", &report);

        Ok(request)
    }

    pub async fn accept_friend_request(
        &self,
        caller: Uuid,
        request_id: Uuid,
    ) -> AppResult<FriendRequest> {
        let request = self
            .storage
            .get_friend_request(request_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if request.to_user_id != caller {
            return Err(AppError::Forbidden);
        }

        let request = self.storage.accept_friend_request(request_id).await?;

        // Direct notification to the original requester only
        let event = ServerEvent::FriendRequestAccepted {
            request_id,
            by_user_id: caller,
        };
        let report = self
            .fanout
            .deliver(&[request.from_user_id], &event, None)
            .await;
        log_report("friend.accepted", &report);

        Ok(request)
    }

    /// Declines are silent towards the requester; they learn nothing until
    /// a later snapshot.
    pub async fn decline_friend_request(&self, caller: Uuid, request_id: Uuid) -> AppResult<()> {
        let request = self
            .storage
            .get_friend_request(request_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if request.to_user_id != caller {
            return Err(AppError::Forbidden);
        }

        self.storage.decline_friend_request(request_id).await?;
        Ok(())
    }

    /// Toggle a block. Only the acting user is acked; the blocked party is
    /// never notified.
    pub async fn toggle_block(&self, caller: Uuid, target: Uuid) -> AppResult<bool> {
        if target == caller {
            return Err(AppError::BadRequest("cannot block yourself".into()));
        }
        if !self.storage.user_exists(target).await? {
            return Err(AppError::NotFound);
        }

        let blocked = !self.storage.is_blocked(caller, target).await?;
        self.storage.set_block(caller, target, blocked).await?;

        let ack = ServerEvent::BlockToggled {
            target_user_id: target,
            blocked,
        };
        self.fanout.deliver(&[caller], &ack, None).await;
        Ok(blocked)
    }

    /// Profile changes go to the caller plus everyone who can see them:
    /// friends and all chat co-members.
    pub async fn update_profile(
        &self,
        caller: Uuid,
        username: Option<&str>,
        avatar_url: Option<&str>,
    ) -> AppResult<User> {
        if username.is_none() && avatar_url.is_none() {
            return Err(AppError::BadRequest("nothing to update".into()));
        }
        if let Some(name) = username {
            if name.trim().is_empty() {
                return Err(AppError::BadRequest("username is empty".into()));
            }
        }

        let user = self
            .storage
            .update_profile(caller, username, avatar_url)
            .await?;

        let mut audience = self.storage.presence_audience(caller).await?;
        audience.push(caller);

        let event = ServerEvent::ProfileUpdated {
            user_id: caller,
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
        };
        let report = self.fanout.deliver(&audience, &event, None).await;
        log_report("profile.updated", &report);

        Ok(user)
    }

    pub async fn update_settings(
        &self,
        caller: Uuid,
        sounds_enabled: bool,
        previews_enabled: bool,
    ) -> AppResult<()> {
        let settings = NotificationSettings {
            user_id: caller,
            sounds_enabled,
            previews_enabled,
        };
        self.storage.update_settings(&settings).await?;

        let ack = ServerEvent::SettingsUpdated {
            sounds_enabled,
            previews_enabled,
        };
        self.fanout.deliver(&[caller], &ack, None).await;
        Ok(())
    }
}

fn log_report(event_type: &str, report: &DeliveryReport) {
    if !report.is_clean() {
        tracing::warn!(
            event = event_type,
            delivered = report.delivered.len(),
            offline = report.offline.len(),
            failed = report.failed.len(),
            "fan-out completed with failures"
        );
    }
}
