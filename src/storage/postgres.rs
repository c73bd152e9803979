use crate::error::{AppError, AppResult};
use crate::models::{
    Chat, ChatPreview, FriendRequest, FriendRequestStatus, Message, NotificationSettings,
    SessionSnapshot, User,
};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStorage {
    db: Pool<Postgres>,
}

impl PgStorage {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

fn request_from_row(r: &sqlx::postgres::PgRow) -> FriendRequest {
    let status: String = r.get("status");
    FriendRequest {
        id: r.get("id"),
        from_user_id: r.get("from_user_id"),
        to_user_id: r.get("to_user_id"),
        status: FriendRequestStatus::parse(&status),
        created_at: r.get("created_at"),
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn user_exists(&self, user_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;
        Ok(exists)
    }

    async fn chat_exists(&self, chat_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chats WHERE id = $1)")
            .bind(chat_id)
            .fetch_one(&self.db)
            .await?;
        Ok(exists)
    }

    async fn chat_members(&self, chat_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM chat_members WHERE chat_id = $1")
                .bind(chat_id)
                .fetch_all(&self.db)
                .await?;
        Ok(ids)
    }

    async fn is_chat_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM chat_members WHERE chat_id = $1 AND user_id = $2)",
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn friends_of(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT friend_id FROM friendships WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.db)
                .await?;
        Ok(ids)
    }

    async fn presence_audience(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        // Friends plus shared-chat co-members, one round trip
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT DISTINCT other FROM (
                   SELECT friend_id AS other FROM friendships WHERE user_id = $1
                   UNION
                   SELECT cm2.user_id AS other
                   FROM chat_members cm1
                   JOIN chat_members cm2 ON cm1.chat_id = cm2.chat_id
                   WHERE cm1.user_id = $1
               ) t
               WHERE other <> $1"#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    async fn is_blocked(&self, blocker: Uuid, target: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM blocks WHERE blocker_id = $1 AND blocked_id = $2)",
        )
        .bind(blocker)
        .bind(target)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn create_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO messages (id, chat_id, sender_id, content) \
             VALUES ($1, $2, $3, $4) RETURNING created_at",
        )
        .bind(id)
        .bind(chat_id)
        .bind(sender_id)
        .bind(content)
        .fetch_one(&self.db)
        .await?;
        let created_at: DateTime<Utc> = row.get("created_at");
        Ok(Message {
            id,
            chat_id,
            sender_id,
            content: content.to_string(),
            created_at,
        })
    }

    async fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO message_reads (chat_id, user_id, last_read_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (chat_id, user_id) DO UPDATE SET last_read_at = NOW()",
        )
        .bind(chat_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn create_chat(
        &self,
        creator: Uuid,
        name: Option<&str>,
        member_ids: &[Uuid],
    ) -> AppResult<Chat> {
        let id = Uuid::new_v4();
        let mut tx = self.db.begin().await?;

        let row = sqlx::query(
            "INSERT INTO chats (id, name, created_by) VALUES ($1, $2, $3) RETURNING created_at",
        )
        .bind(id)
        .bind(name)
        .bind(creator)
        .fetch_one(&mut *tx)
        .await?;
        let created_at: DateTime<Utc> = row.get("created_at");

        for member in member_ids {
            sqlx::query(
                "INSERT INTO chat_members (chat_id, user_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(member)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Chat {
            id,
            name: name.map(|s| s.to_string()),
            created_by: creator,
            created_at,
        })
    }

    async fn add_chat_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO chat_members (chat_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(chat_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn remove_chat_member(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM chat_members WHERE chat_id = $1 AND user_id = $2")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_friend_request(&self, from: Uuid, to: Uuid) -> AppResult<FriendRequest> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO friend_requests (id, from_user_id, to_user_id, status) \
             VALUES ($1, $2, $3, $4) RETURNING created_at",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(FriendRequestStatus::Pending.as_str())
        .fetch_one(&self.db)
        .await?;
        let created_at: DateTime<Utc> = row.get("created_at");
        Ok(FriendRequest {
            id,
            from_user_id: from,
            to_user_id: to,
            status: FriendRequestStatus::Pending,
            created_at,
        })
    }

    async fn get_friend_request(&self, request_id: Uuid) -> AppResult<Option<FriendRequest>> {
        let row = sqlx::query(
            "SELECT id, from_user_id, to_user_id, status, created_at \
             FROM friend_requests WHERE id = $1",
        )
        .bind(request_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.as_ref().map(request_from_row))
    }

    async fn accept_friend_request(&self, request_id: Uuid) -> AppResult<FriendRequest> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query(
            "UPDATE friend_requests SET status = $2 WHERE id = $1 \
             RETURNING id, from_user_id, to_user_id, status, created_at",
        )
        .bind(request_id)
        .bind(FriendRequestStatus::Accepted.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound)?;
        let request = request_from_row(&row);

        // Symmetric rows so audience queries only scan one column
        for (a, b) in [
            (request.from_user_id, request.to_user_id),
            (request.to_user_id, request.from_user_id),
        ] {
            sqlx::query(
                "INSERT INTO friendships (user_id, friend_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(a)
            .bind(b)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(request)
    }

    async fn decline_friend_request(&self, request_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("UPDATE friend_requests SET status = $2 WHERE id = $1")
            .bind(request_id)
            .bind(FriendRequestStatus::Declined.as_str())
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn set_block(&self, blocker: Uuid, target: Uuid, blocked: bool) -> AppResult<()> {
        if blocked {
            sqlx::query(
                "INSERT INTO blocks (blocker_id, blocked_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(blocker)
            .bind(target)
            .execute(&self.db)
            .await?;
        } else {
            sqlx::query("DELETE FROM blocks WHERE blocker_id = $1 AND blocked_id = $2")
                .bind(blocker)
                .bind(target)
                .execute(&self.db)
                .await?;
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        username: Option<&str>,
        avatar_url: Option<&str>,
    ) -> AppResult<User> {
        let row = sqlx::query(
            "UPDATE users SET username = COALESCE($2, username), \
                              avatar_url = COALESCE($3, avatar_url) \
             WHERE id = $1 RETURNING id, username, avatar_url, created_at",
        )
        .bind(user_id)
        .bind(username)
        .bind(avatar_url)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound)?;

        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            avatar_url: row.get("avatar_url"),
            created_at: row.get("created_at"),
        })
    }

    async fn update_settings(&self, settings: &NotificationSettings) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO notification_settings (user_id, sounds_enabled, previews_enabled, updated_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (user_id) DO UPDATE \
             SET sounds_enabled = $2, previews_enabled = $3, updated_at = NOW()",
        )
        .bind(settings.user_id)
        .bind(settings.sounds_enabled)
        .bind(settings.previews_enabled)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn snapshot(&self, user_id: Uuid) -> AppResult<SessionSnapshot> {
        let chat_rows = sqlx::query(
            r#"SELECT ch.id AS chat_id,
                      ch.name,
                      (SELECT content FROM messages m
                       WHERE m.chat_id = ch.id
                       ORDER BY m.created_at DESC LIMIT 1) AS last_message,
                      (SELECT COUNT(*) FROM messages m
                       WHERE m.chat_id = ch.id
                         AND m.sender_id <> $1
                         AND m.created_at > COALESCE(
                             (SELECT r.last_read_at FROM message_reads r
                              WHERE r.chat_id = ch.id AND r.user_id = $1),
                             'epoch'::timestamptz)) AS unread_count
               FROM chats ch
               JOIN chat_members cm ON cm.chat_id = ch.id
               WHERE cm.user_id = $1
               ORDER BY ch.created_at ASC"#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let chats = chat_rows
            .into_iter()
            .map(|r| ChatPreview {
                chat_id: r.get("chat_id"),
                name: r.get("name"),
                last_message: r.get("last_message"),
                unread_count: r.get("unread_count"),
            })
            .collect();

        let request_rows = sqlx::query(
            "SELECT id, from_user_id, to_user_id, status, created_at \
             FROM friend_requests WHERE to_user_id = $1 AND status = $2 \
             ORDER BY created_at ASC",
        )
        .bind(user_id)
        .bind(FriendRequestStatus::Pending.as_str())
        .fetch_all(&self.db)
        .await?;
        let pending_requests = request_rows.iter().map(request_from_row).collect();

        let settings_row = sqlx::query(
            "SELECT user_id, sounds_enabled, previews_enabled \
             FROM notification_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        let settings = match settings_row {
            Some(r) => NotificationSettings {
                user_id: r.get("user_id"),
                sounds_enabled: r.get("sounds_enabled"),
                previews_enabled: r.get("previews_enabled"),
            },
            None => NotificationSettings::defaults_for(user_id),
        };

        let blocked: Vec<Uuid> =
            sqlx::query_scalar("SELECT blocked_id FROM blocks WHERE blocker_id = $1")
                .bind(user_id)
                .fetch_all(&self.db)
                .await?;

        Ok(SessionSnapshot {
            chats,
            pending_requests,
            settings,
            blocked,
        })
    }
}
