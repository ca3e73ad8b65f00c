//! Repository traits - abstraction layer for data access
//!
//! Services talk to storage only through these traits, so the PostgreSQL
//! backend and the in-memory backend are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use kingdom_core::tiles::{Tile, TileCell};

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, StorageError>;

/// A user's character: the experience ledger plus gold
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterRecord {
    pub user_id: String,
    pub experience: i64,
    /// Cached; the leveling engine is the source of truth
    pub level: i32,
    pub gold: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Realm tiles
// ============================================================================

#[async_trait]
pub trait TileRepo: Send + Sync {
    /// All stored cells of one user's realm, ordered by (y, x).
    async fn list(&self, user_id: &str) -> RepoResult<Vec<Tile>>;

    /// Insert cells whose (user, x, y) key is not taken yet; existing rows are
    /// left untouched. All-or-nothing. Returns the number of rows inserted.
    async fn insert_missing(&self, user_id: &str, cells: &[TileCell]) -> RepoResult<u64>;

    /// Insert or overwrite one cell, refreshing its update time.
    async fn upsert(&self, user_id: &str, tile: &Tile) -> RepoResult<Tile>;

    /// Insert or overwrite many distinct cells in one round trip.
    async fn upsert_many(&self, user_id: &str, tiles: &[Tile]) -> RepoResult<Vec<Tile>>;
}

// ============================================================================
// Characters
// ============================================================================

#[async_trait]
pub trait CharacterRepo: Send + Sync {
    async fn get(&self, user_id: &str) -> RepoResult<Option<CharacterRecord>>;

    /// Atomically add to experience and gold, creating the character if needed.
    async fn add_rewards(
        &self,
        user_id: &str,
        experience: i64,
        gold: i64,
    ) -> RepoResult<CharacterRecord>;

    /// Overwrite experience (restore), creating the character if needed.
    async fn set_experience(&self, user_id: &str, experience: i64) -> RepoResult<CharacterRecord>;

    /// Store the cached level, but only while experience still equals
    /// `experience`. Returns false when a concurrent write got there first.
    async fn cache_level(&self, user_id: &str, level: i32, experience: i64) -> RepoResult<bool>;
}

// ============================================================================
// Friendships
// ============================================================================

#[async_trait]
pub trait FriendshipRepo: Send + Sync {
    async fn send_request(&self, user_id: &str, friend_id: &str) -> RepoResult<()>;

    /// Accept a pending request sent by `requester_id` to `user_id`.
    async fn accept_request(&self, user_id: &str, requester_id: &str) -> RepoResult<()>;

    /// True when an accepted friendship links the two users in either direction.
    async fn are_friends(&self, user_id: &str, other_id: &str) -> RepoResult<bool>;
}

// ============================================================================
// Unified Storage Manager
// ============================================================================

/// Central storage manager that holds all repositories
#[derive(Clone)]
pub struct StorageManager {
    pub tiles: Arc<dyn TileRepo>,
    pub characters: Arc<dyn CharacterRepo>,
    pub friendships: Arc<dyn FriendshipRepo>,
}
