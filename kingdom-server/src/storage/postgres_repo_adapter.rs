//! PostgreSQL Repository Adapters
//!
//! Implements the Repository traits from `repository.rs` using PostgresStore
//! as the backend. Converts SQL row types into domain types.

use async_trait::async_trait;
use std::sync::Arc;

use kingdom_core::tiles::{Tile, TileCell};

use super::postgres::{PostgresStore, TileRow};
use super::repository::*;

fn rows_to_tiles(rows: Vec<TileRow>) -> RepoResult<Vec<Tile>> {
    rows.into_iter().map(Tile::try_from).collect()
}

// ============================================================================
// TileRepo Adapter
// ============================================================================

pub struct PgTileRepo {
    store: Arc<PostgresStore>,
}

impl PgTileRepo {
    pub fn new(store: Arc<PostgresStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TileRepo for PgTileRepo {
    async fn list(&self, user_id: &str) -> RepoResult<Vec<Tile>> {
        rows_to_tiles(self.store.get_tiles(user_id).await?)
    }

    async fn insert_missing(&self, user_id: &str, cells: &[TileCell]) -> RepoResult<u64> {
        self.store.insert_tiles_if_absent(user_id, cells).await
    }

    async fn upsert(&self, user_id: &str, tile: &Tile) -> RepoResult<Tile> {
        let row = self.store.upsert_tile(user_id, tile).await?;
        Tile::try_from(row)
    }

    async fn upsert_many(&self, user_id: &str, tiles: &[Tile]) -> RepoResult<Vec<Tile>> {
        rows_to_tiles(self.store.upsert_tiles(user_id, tiles).await?)
    }
}

// ============================================================================
// CharacterRepo Adapter
// ============================================================================

pub struct PgCharacterRepo {
    store: Arc<PostgresStore>,
}

impl PgCharacterRepo {
    pub fn new(store: Arc<PostgresStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CharacterRepo for PgCharacterRepo {
    async fn get(&self, user_id: &str) -> RepoResult<Option<CharacterRecord>> {
        let row = self.store.get_character(user_id).await?;
        Ok(row.map(CharacterRecord::from))
    }

    async fn add_rewards(
        &self,
        user_id: &str,
        experience: i64,
        gold: i64,
    ) -> RepoResult<CharacterRecord> {
        let row = self
            .store
            .add_character_rewards(user_id, experience, gold)
            .await?;
        Ok(row.into())
    }

    async fn set_experience(&self, user_id: &str, experience: i64) -> RepoResult<CharacterRecord> {
        let row = self
            .store
            .set_character_experience(user_id, experience)
            .await?;
        Ok(row.into())
    }

    async fn cache_level(&self, user_id: &str, level: i32, experience: i64) -> RepoResult<bool> {
        self.store
            .set_character_level(user_id, level, experience)
            .await
    }
}

// ============================================================================
// FriendshipRepo Adapter
// ============================================================================

pub struct PgFriendshipRepo {
    store: Arc<PostgresStore>,
}

impl PgFriendshipRepo {
    pub fn new(store: Arc<PostgresStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FriendshipRepo for PgFriendshipRepo {
    async fn send_request(&self, user_id: &str, friend_id: &str) -> RepoResult<()> {
        self.store.send_friend_request(user_id, friend_id).await
    }

    async fn accept_request(&self, user_id: &str, requester_id: &str) -> RepoResult<()> {
        self.store
            .accept_friend_request(user_id, requester_id)
            .await
    }

    async fn are_friends(&self, user_id: &str, other_id: &str) -> RepoResult<bool> {
        self.store.are_friends(user_id, other_id).await
    }
}
