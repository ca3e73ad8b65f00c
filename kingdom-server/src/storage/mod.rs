//! Storage Layer - Unified data access for the kingdom server
//!
//! Implements the Repository pattern with two interchangeable backends:
//! - **PostgreSQL**: realm tiles, characters, friendships (production)
//! - **Memory**: the same contract in process (tests, local development)
//!
//! ## Architecture
//! ```text
//! [RealmService / CharacterService]
//!       ↓
//! [Repository Traits]
//!       ↓
//! ┌──────────────────┬──────────────┐
//! │ PostgresStore    │ MemoryStore  │
//! │ + RepoAdapters   │              │
//! └──────────────────┴──────────────┘
//! ```

pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod postgres_repo_adapter;
pub mod repository;

use std::sync::Arc;
use tracing::info;

use self::memory::MemoryStore;
use self::postgres::PostgresStore;
use self::postgres_repo_adapter::*;
use self::repository::StorageManager;

impl StorageManager {
    /// Repositories backed by a PostgreSQL store
    pub fn postgres(pg: Arc<PostgresStore>) -> Self {
        Self {
            tiles: Arc::new(PgTileRepo::new(pg.clone())),
            characters: Arc::new(PgCharacterRepo::new(pg.clone())),
            friendships: Arc::new(PgFriendshipRepo::new(pg)),
        }
    }

    /// Repositories sharing one in-memory store
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            tiles: store.clone(),
            characters: store.clone(),
            friendships: store,
        }
    }
}

/// Connect to PostgreSQL, apply migrations and build the repositories
pub async fn init_postgres_storage(
    postgres_url: &str,
    pg_max_connections: u32,
) -> Result<StorageManager, repository::StorageError> {
    let pg = Arc::new(PostgresStore::new(postgres_url, pg_max_connections).await?);
    info!("PostgreSQL storage initialized");
    Ok(StorageManager::postgres(pg))
}
