//! Shared in-process harness: the full realtime stack over the in-memory
//! storage backend, no sockets and no external services.

use axum::extract::ws::Message;
use chat_realtime_service::models::ClientInfo;
use chat_realtime_service::realtime::{
    ConnectionRecord, ConnectionRegistry, Dispatcher, FanoutRouter, PresenceTracker,
    SessionCoordinator,
};
use chat_realtime_service::storage::{MemoryStorage, Storage};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub struct TestApp {
    pub storage: MemoryStorage,
    pub registry: ConnectionRegistry,
    pub sessions: SessionCoordinator,
    pub dispatcher: Dispatcher,
}

impl TestApp {
    pub fn new() -> Self {
        let storage = MemoryStorage::new();
        let shared: Arc<dyn Storage> = Arc::new(storage.clone());
        let registry = ConnectionRegistry::new();
        let fanout = FanoutRouter::new(registry.clone());
        let presence = PresenceTracker::new(shared.clone(), fanout.clone());
        let sessions = SessionCoordinator::new(registry.clone(), presence, shared.clone());
        let dispatcher = Dispatcher::new(shared, fanout);
        Self {
            storage,
            registry,
            sessions,
            dispatcher,
        }
    }

    /// Connect a user through the full session lifecycle and hand back the
    /// connection id plus the queue a real transport task would drain.
    pub async fn connect(&self, user_id: Uuid) -> (Uuid, UnboundedReceiver<Message>) {
        let (record, rx) = ConnectionRecord::new(user_id, ClientInfo::default());
        let connection_id = record.connection_id;
        self.sessions
            .on_connect(record)
            .await
            .expect("session setup");
        (connection_id, rx)
    }
}

/// Pop the next queued frame as parsed JSON; panics when the queue is empty.
pub fn next_event(rx: &mut UnboundedReceiver<Message>) -> serde_json::Value {
    match rx.try_recv().expect("expected a queued event") {
        Message::Text(text) => serde_json::from_str(&text).expect("event payload is JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Pop all currently queued frames as parsed JSON.
pub fn drain_events(rx: &mut UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(Message::Text(text)) = rx.try_recv() {
        events.push(serde_json::from_str(&text).expect("event payload is JSON"));
    }
    events
}
