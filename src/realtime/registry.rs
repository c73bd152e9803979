//! Connection registry: user identity -> at most one live connection.
//!
//! A record holds the per-connection outbound queue. Because every delivery
//! to a connection goes through its single unbounded channel, send order is
//! preserved per connection without any global serialization.
//!
//! Registration is last-writer-wins: a reconnect from the same user
//! supersedes the previous record. Deregistration is compare-and-swap on the
//! connection id, so a stale disconnect racing a fresh register can never
//! evict the new connection.

use crate::models::ClientInfo;
use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

#[derive(Clone)]
pub struct ConnectionRecord {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub client: ClientInfo,
    pub connected_at: DateTime<Utc>,
    sender: UnboundedSender<Message>,
}

impl ConnectionRecord {
    /// Create a record plus the receiving half its transport task drains.
    pub fn new(user_id: Uuid, client: ClientInfo) -> (Self, UnboundedReceiver<Message>) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                connection_id: Uuid::new_v4(),
                user_id,
                client,
                connected_at: Utc::now(),
                sender: tx,
            },
            rx,
        )
    }

    /// Queue one frame for this connection. Fails when the transport task
    /// has dropped its receiver (connection already gone).
    pub fn send(&self, msg: Message) -> Result<(), ()> {
        self.sender.send(msg).map_err(|_| ())
    }
}

#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // user_id -> active connection record
    inner: Arc<RwLock<HashMap<Uuid, ConnectionRecord>>>,
    // Liveness mirror for multi-instance deployments; the local map stays
    // authoritative for delivery and for the compare-and-swap rule.
    mirror: Option<redis::Client>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mirror(mirror: redis::Client) -> Self {
        Self {
            inner: Arc::default(),
            mirror: Some(mirror),
        }
    }

    fn mirror_key(user_id: Uuid) -> String {
        format!("presence:user:{}", user_id)
    }

    /// Register a connection; an existing record for the same user is
    /// superseded (last writer wins) and returned.
    pub async fn register(&self, record: ConnectionRecord) -> Option<ConnectionRecord> {
        let user_id = record.user_id;
        let connection_id = record.connection_id;
        let previous = {
            let mut guard = self.inner.write().await;
            guard.insert(user_id, record)
        };

        if let Some(client) = &self.mirror {
            if let Err(e) = mirror_set(client, user_id, connection_id).await {
                tracing::warn!(%user_id, error = %e, "presence mirror write failed");
            }
        }

        previous
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionRecord> {
        self.inner.read().await.get(&user_id).cloned()
    }

    /// Batch lookup. Never fails partially: an offline user is represented
    /// as a `None` entry, not an error.
    pub async fn lookup_many(&self, user_ids: &[Uuid]) -> HashMap<Uuid, Option<ConnectionRecord>> {
        let guard = self.inner.read().await;
        user_ids
            .iter()
            .map(|id| (*id, guard.get(id).cloned()))
            .collect()
    }

    /// Remove the user's record only if it still carries `connection_id`.
    /// A stale deregister (connection already superseded) is a no-op and
    /// returns `None`; removing an absent entry is not an error.
    pub async fn deregister(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
    ) -> Option<ConnectionRecord> {
        let removed = {
            let mut guard = self.inner.write().await;
            match guard.get(&user_id) {
                Some(current) if current.connection_id == connection_id => guard.remove(&user_id),
                _ => None,
            }
        };

        if removed.is_some() {
            if let Some(client) = &self.mirror {
                if let Err(e) = mirror_clear(client, user_id).await {
                    tracing::warn!(%user_id, error = %e, "presence mirror delete failed");
                }
            }
        }

        removed
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

async fn mirror_set(
    client: &redis::Client,
    user_id: Uuid,
    connection_id: Uuid,
) -> redis::RedisResult<()> {
    use redis::AsyncCommands;
    let mut conn = client.get_multiplexed_async_connection().await?;
    conn.set(
        ConnectionRegistry::mirror_key(user_id),
        connection_id.to_string(),
    )
    .await
}

async fn mirror_clear(client: &redis::Client, user_id: Uuid) -> redis::RedisResult<()> {
    use redis::AsyncCommands;
    let mut conn = client.get_multiplexed_async_connection().await?;
    conn.del(ConnectionRegistry::mirror_key(user_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_for(user: Uuid) -> (ConnectionRecord, UnboundedReceiver<Message>) {
        ConnectionRecord::new(user, ClientInfo::default())
    }

    #[tokio::test]
    async fn second_register_supersedes_first() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (c1, _rx1) = record_for(user);
        let (c2, _rx2) = record_for(user);
        let c2_id = c2.connection_id;

        assert!(registry.register(c1.clone()).await.is_none());
        let superseded = registry.register(c2).await.unwrap();
        assert_eq!(superseded.connection_id, c1.connection_id);

        let current = registry.lookup(user).await.unwrap();
        assert_eq!(current.connection_id, c2_id);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn stale_deregister_is_a_noop() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (c1, _rx1) = record_for(user);
        let (c2, _rx2) = record_for(user);
        let c1_id = c1.connection_id;
        let c2_id = c2.connection_id;

        registry.register(c1).await;
        registry.register(c2).await;

        // c1's disconnect arrives after c2 already took over
        assert!(registry.deregister(user, c1_id).await.is_none());
        let current = registry.lookup(user).await.unwrap();
        assert_eq!(current.connection_id, c2_id);

        // the real deregister still works
        assert!(registry.deregister(user, c2_id).await.is_some());
        assert!(registry.lookup(user).await.is_none());
    }

    #[tokio::test]
    async fn deregister_absent_user_returns_none() {
        let registry = ConnectionRegistry::new();
        assert!(registry
            .deregister(Uuid::new_v4(), Uuid::new_v4())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn lookup_many_represents_offline_users() {
        let registry = ConnectionRegistry::new();
        let online = Uuid::new_v4();
        let offline = Uuid::new_v4();

        let (record, _rx) = record_for(online);
        registry.register(record).await;

        let resolved = registry.lookup_many(&[online, offline]).await;
        assert_eq!(resolved.len(), 2);
        assert!(resolved[&online].is_some());
        assert!(resolved[&offline].is_none());
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let user = Uuid::new_v4();
        let (record, rx) = record_for(user);
        drop(rx);
        assert!(record.send(Message::Text("x".into())).is_err());
    }
}
