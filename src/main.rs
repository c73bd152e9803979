use chat_realtime_service::realtime::{pubsub, ConnectionRegistry, FanoutRouter};
use chat_realtime_service::storage::PgStorage;
use chat_realtime_service::{config, db, error, logging, migrations, routes, state::AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = config::Config::from_env()?;

    let pool = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Run embedded migrations (idempotent)
    migrations::run_all(&pool)
        .await
        .map_err(|e| error::AppError::StartServer(format!("database migrations failed: {e}")))?;

    // Redis is optional: without it the service runs single-instance with
    // local-only fan-out and no presence mirror.
    let redis = match cfg.redis_url.as_deref() {
        Some(url) => Some(
            redis::Client::open(url)
                .map_err(|e| error::AppError::StartServer(format!("redis: {e}")))?,
        ),
        None => None,
    };

    let registry = match redis.clone() {
        Some(client) => ConnectionRegistry::with_mirror(client),
        None => ConnectionRegistry::new(),
    };
    let fanout = match redis.clone() {
        Some(client) => FanoutRouter::with_redis(registry.clone(), client),
        None => FanoutRouter::new(registry.clone()),
    };

    if let Some(client) = redis {
        let listener_registry = registry.clone();
        let instance_id = fanout.instance_id();
        tokio::spawn(async move {
            if let Err(e) =
                pubsub::start_fanout_listener(client, listener_registry, instance_id).await
            {
                tracing::error!(error = %e, "fan-out listener failed");
            }
        });
    }

    let storage = Arc::new(PgStorage::new(pool));
    let port = cfg.port;
    let state = AppState::new(storage, registry, fanout, cfg);

    let bind_addr = format!("0.0.0.0:{port}");
    tracing::info!(%bind_addr, "starting chat-realtime-service");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(format!("bind {bind_addr}: {e}")))?;
    axum::serve(listener, routes::build_router(state))
        .await
        .map_err(|e| error::AppError::StartServer(format!("serve: {e}")))?;

    Ok(())
}
