//! Session lifecycle coordinator.
//!
//! Connect: register -> announce online -> push snapshot to the new
//! connection only. Disconnect: compare-and-swap deregister -> announce
//! offline only when a record was actually removed, which both guards
//! against double invocation and makes a stale disconnect racing a fresh
//! register harmless.

use crate::error::AppResult;
use crate::realtime::events::ServerEvent;
use crate::realtime::presence::PresenceTracker;
use crate::realtime::registry::{ConnectionRecord, ConnectionRegistry};
use crate::storage::Storage;
use axum::extract::ws::Message;
use std::sync::Arc;
use uuid::Uuid;

pub struct SessionCoordinator {
    registry: ConnectionRegistry,
    presence: PresenceTracker,
    storage: Arc<dyn Storage>,
}

impl SessionCoordinator {
    pub fn new(
        registry: ConnectionRegistry,
        presence: PresenceTracker,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            registry,
            presence,
            storage,
        }
    }

    /// Runs after the transport established a connection for an already
    /// authenticated user. Identity resolution happens upstream; this layer
    /// never sees an unauthenticated connection.
    pub async fn on_connect(&self, record: ConnectionRecord) -> AppResult<()> {
        let user_id = record.user_id;
        let connection = record.clone();

        if let Some(previous) = self.registry.register(record).await {
            // Reconnect supersession: the old transport is not force-closed,
            // its next send will fail and it will tear itself down.
            tracing::info!(
                user_id = %user_id,
                superseded = %previous.connection_id,
                "connection superseded by reconnect"
            );
        }

        // Registry write committed; observers may now learn about it.
        match self.presence.announce_online(user_id).await {
            Ok(report) => {
                tracing::debug!(user_id = %user_id, notified = report.delivered.len(), "announced online");
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "online announcement failed");
            }
        }

        // Initial state, to the new connection only. Not fatal: the client
        // can re-fetch the snapshot over HTTP.
        match self.storage.snapshot(user_id).await {
            Ok(snapshot) => {
                let event = ServerEvent::Snapshot {
                    chats: snapshot.chats,
                    pending_requests: snapshot.pending_requests,
                    settings: snapshot.settings,
                    blocked: snapshot.blocked,
                };
                match event.to_payload() {
                    Ok(payload) => {
                        if connection.send(Message::Text(payload)).is_err() {
                            tracing::warn!(user_id = %user_id, "snapshot push failed: connection closed");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(user_id = %user_id, error = %e, "snapshot serialization failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "snapshot fetch failed");
            }
        }

        Ok(())
    }

    /// Invoked exactly once per transport disconnect, graceful or abnormal.
    /// Safe against double invocation and against racing a fresh register.
    pub async fn on_disconnect(&self, user_id: Uuid, connection_id: Uuid) {
        let Some(_removed) = self.registry.deregister(user_id, connection_id).await else {
            // Already superseded or already deregistered: nothing to announce.
            tracing::debug!(user_id = %user_id, connection_id = %connection_id, "stale disconnect ignored");
            return;
        };

        // Deregister committed before anyone hears "offline", so a
        // concurrent lookup can never contradict the announcement.
        if let Err(e) = self.presence.announce_offline(user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "offline announcement failed");
        }
    }
}
