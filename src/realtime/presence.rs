//! Presence tracker: broadcast online/offline transitions to the user's
//! social audience (friends plus shared-chat co-members).
//!
//! Ordering is the caller's responsibility and the session coordinator
//! upholds it: announce_online runs only after the registry write committed,
//! announce_offline only after the deregister committed. An observer doing a
//! concurrent lookup therefore never sees an announcement contradicting the
//! registry.

use crate::error::AppResult;
use crate::realtime::events::ServerEvent;
use crate::realtime::fanout::{DeliveryReport, FanoutRouter};
use crate::storage::Storage;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct PresenceTracker {
    storage: Arc<dyn Storage>,
    fanout: FanoutRouter,
}

impl PresenceTracker {
    pub fn new(storage: Arc<dyn Storage>, fanout: FanoutRouter) -> Self {
        Self { storage, fanout }
    }

    pub async fn announce_online(&self, user_id: Uuid) -> AppResult<DeliveryReport> {
        self.announce(user_id, true).await
    }

    pub async fn announce_offline(&self, user_id: Uuid) -> AppResult<DeliveryReport> {
        self.announce(user_id, false).await
    }

    async fn announce(&self, user_id: Uuid, is_online: bool) -> AppResult<DeliveryReport> {
        let audience = self.storage.presence_audience(user_id).await?;
        let event = ServerEvent::StatusUpdate { user_id, is_online };
        let report = self.fanout.deliver(&audience, &event, Some(user_id)).await;
        if !report.is_clean() {
            tracing::debug!(
                user_id = %user_id,
                is_online,
                failed = report.failed.len(),
                "presence announcement partially delivered"
            );
        }
        Ok(report)
    }
}
