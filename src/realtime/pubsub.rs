//! Cross-instance fan-out over Redis pub/sub.
//!
//! Each `deliver` publishes its resolved target batch on one shared channel.
//! Sibling instances replay the batch against their local registries; the
//! envelope carries the origin instance id so the publisher skips its own
//! broadcasts and no connection ever receives a duplicate.

use crate::realtime::registry::ConnectionRegistry;
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const FANOUT_CHANNEL: &str = "fanout:events";

#[derive(Debug, Serialize, Deserialize)]
struct RemoteDelivery {
    instance_id: Uuid,
    targets: Vec<Uuid>,
    payload: String,
}

pub async fn publish(
    client: &Client,
    instance_id: Uuid,
    targets: &[Uuid],
    payload: &str,
) -> redis::RedisResult<()> {
    if targets.is_empty() {
        return Ok(());
    }
    let envelope = RemoteDelivery {
        instance_id,
        targets: targets.to_vec(),
        payload: payload.to_string(),
    };
    let body = serde_json::to_string(&envelope).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "envelope encode", e.to_string()))
    })?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    conn.publish::<_, _, ()>(FANOUT_CHANNEL, body).await
}

/// Long-running listener, spawned once per process when Redis is configured.
/// Returns only when the subscription stream ends.
pub async fn start_fanout_listener(
    client: Client,
    registry: ConnectionRegistry,
    instance_id: Uuid,
) -> redis::RedisResult<()> {
    // PubSub requires a dedicated connection, not multiplexed
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    pubsub.subscribe(FANOUT_CHANNEL).await?;
    let mut stream = pubsub.on_message();

    while let Some(msg) = stream.next().await {
        let body: String = msg.get_payload()?;
        let envelope: RemoteDelivery = match serde_json::from_str(&body) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed fan-out envelope");
                continue;
            }
        };
        if envelope.instance_id == instance_id {
            continue; // our own broadcast, already delivered locally
        }

        let resolved = registry.lookup_many(&envelope.targets).await;
        for record in resolved.values().flatten() {
            if record
                .send(axum::extract::ws::Message::Text(envelope.payload.clone()))
                .is_err()
            {
                tracing::debug!(
                    connection_id = %record.connection_id,
                    "remote fan-out target rejected send"
                );
            }
        }
    }
    Ok(())
}
