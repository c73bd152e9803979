//! Fan-out router: resolve an audience to live connections and deliver.
//!
//! One batched registry lookup per `deliver` call, then one independent send
//! per resolved connection. A failed send is recorded in the report and
//! never aborts delivery to the remaining targets; nothing here retries or
//! blocks the caller. Per-connection ordering falls out of the registry's
//! per-connection queue.

use crate::realtime::events::ServerEvent;
use crate::realtime::pubsub;
use crate::realtime::registry::ConnectionRegistry;
use axum::extract::ws::Message;
use uuid::Uuid;

#[derive(Debug)]
pub struct DeliveryFailure {
    pub user_id: Uuid,
    pub connection_id: Uuid,
    pub reason: String,
}

/// Outcome of one `deliver` call, for observability only: callers log it,
/// they never branch on it to retry.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: Vec<Uuid>,
    pub offline: Vec<Uuid>,
    pub failed: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct FanoutRouter {
    registry: ConnectionRegistry,
    redis: Option<redis::Client>,
    instance_id: Uuid,
}

impl FanoutRouter {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            redis: None,
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn with_redis(registry: ConnectionRegistry, client: redis::Client) -> Self {
        Self {
            registry,
            redis: Some(client),
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Deliver `event` to every audience member with a live local
    /// connection, skipping `exclude` (a sender that already holds a local
    /// copy). Also publishes the batch for sibling instances.
    pub async fn deliver(
        &self,
        audience: &[Uuid],
        event: &ServerEvent,
        exclude: Option<Uuid>,
    ) -> DeliveryReport {
        let payload = match event.to_payload() {
            Ok(p) => p,
            Err(e) => {
                // Serialization of our own closed enum failing is a bug;
                // log and deliver nothing rather than poison the caller.
                tracing::error!(event = event.event_type(), error = %e, "event serialization failed");
                return DeliveryReport::default();
            }
        };

        let targets = dedup_targets(audience, exclude);
        let report = self.deliver_local(&targets, &payload).await;

        if let Some(client) = &self.redis {
            if let Err(e) =
                pubsub::publish(client, self.instance_id, &targets, &payload).await
            {
                tracing::warn!(event = event.event_type(), error = %e, "cross-instance publish failed");
            }
        }

        report
    }

    /// Local half of delivery; also used by the pub/sub listener for
    /// batches published by sibling instances.
    pub(crate) async fn deliver_local(&self, targets: &[Uuid], payload: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let resolved = self.registry.lookup_many(targets).await;

        for user_id in targets {
            match resolved.get(user_id).and_then(|r| r.as_ref()) {
                // Offline is not an error: the member simply has no live
                // connection right now.
                None => report.offline.push(*user_id),
                Some(record) => match record.send(Message::Text(payload.to_string())) {
                    Ok(()) => report.delivered.push(*user_id),
                    Err(()) => {
                        tracing::debug!(user_id = %user_id, connection_id = %record.connection_id, "delivery target rejected send");
                        report.failed.push(DeliveryFailure {
                            user_id: *user_id,
                            connection_id: record.connection_id,
                            reason: "connection closed".into(),
                        });
                    }
                },
            }
        }

        report
    }
}

fn dedup_targets(audience: &[Uuid], exclude: Option<Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(audience.len());
    audience
        .iter()
        .copied()
        .filter(|id| Some(*id) != exclude && seen.insert(*id))
        .collect()
}
