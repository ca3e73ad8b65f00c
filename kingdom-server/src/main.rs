use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use kingdom_core::logging::init_tracing;
use kingdom_server::{
    api::{self, ApiState},
    events::{self, EventBus},
    storage::{self, memory::MemoryStore},
    ServerConfig, SignedTokenIdentity, StorageManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;
    init_tracing(&config.tracing);

    info!("Starting kingdom server v{}", env!("CARGO_PKG_VERSION"));

    // ========================================================================
    // 1. Storage
    // ========================================================================
    let storage = if config.use_memory_store {
        warn!("Using in-memory storage; nothing survives a restart");
        StorageManager::memory(Arc::new(MemoryStore::new()))
    } else {
        storage::init_postgres_storage(&config.database_url, config.pg_max_connections)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "PostgreSQL unavailable at {} ({}); set KINGDOM_MEMORY_STORE=1 to run without it",
                    config.redacted_database_url(),
                    e
                )
            })?
    };

    // ========================================================================
    // 2. Event bus + logger
    // ========================================================================
    let events = EventBus::default();
    tokio::spawn(events::log_events(events.subscribe()));

    // ========================================================================
    // 3. HTTP API
    // ========================================================================
    if config.auth_secret == ServerConfig::default().auth_secret {
        warn!("AUTH_SECRET is the development default");
    }
    let identity = Arc::new(SignedTokenIdentity::new(config.auth_secret.clone()));
    let curve = config.level_curve();
    if curve.top_level() < curve.max_level {
        warn!(
            "MAX_LEVEL {} is beyond the curve; levels stop at {}",
            curve.max_level,
            curve.top_level()
        );
    }
    info!(
        "Max level {}, request timeout {}s",
        curve.top_level(),
        config.request_timeout_secs
    );

    let state = ApiState::new(storage, identity, curve, events)
        .with_request_timeout(Duration::from_secs(config.request_timeout_secs));
    api::start_api_server(state, config.api_port)
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))?;

    info!("Kingdom server shut down");
    Ok(())
}
