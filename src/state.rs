use crate::config::Config;
use crate::realtime::{ConnectionRegistry, Dispatcher, FanoutRouter, SessionCoordinator};
use crate::storage::Storage;
use std::sync::Arc;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub registry: ConnectionRegistry,
    pub fanout: FanoutRouter,
    pub sessions: Arc<SessionCoordinator>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the full stack on top of a storage backend. Redis-backed pieces
    /// are attached by the caller before this via registry/fanout choice.
    pub fn new(
        storage: Arc<dyn Storage>,
        registry: ConnectionRegistry,
        fanout: FanoutRouter,
        config: Config,
    ) -> Self {
        let presence = crate::realtime::PresenceTracker::new(storage.clone(), fanout.clone());
        let sessions = Arc::new(SessionCoordinator::new(
            registry.clone(),
            presence,
            storage.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(storage.clone(), fanout.clone()));
        Self {
            storage,
            registry,
            fanout,
            sessions,
            dispatcher,
            config: Arc::new(config),
        }
    }
}
