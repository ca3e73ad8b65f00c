//! PostgreSQL Storage - realm, character and friendship persistence
//!
//! Uses `sqlx` for async queries against a shared connection pool.
//!
//! ## Tables
//! - realm_tiles (sparse grid, keyed by user_id + x + y)
//! - characters (experience ledger, cached level, gold)
//! - friendships

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{debug, info};

use kingdom_core::tiles::{Tile, TileCell, TileType};

use super::migrations;
use super::repository::{CharacterRecord, StorageError};

/// PostgreSQL connection pool wrapper
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

const TILE_COLUMNS: &str = "x, y, tile_type, event_type, meta";
const CHARACTER_COLUMNS: &str = "user_id, experience, level, gold, updated_at";
/// Rewards saturate here instead of overflowing the BIGINT columns
const BIGINT_MAX: i64 = i64::MAX;

impl PostgresStore {
    /// Connect to PostgreSQL and run migrations
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("PostgreSQL connected (max_connections={})", max_connections);

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run all pending migrations
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name VARCHAR(100) PRIMARY KEY,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;

        for (name, sql) in migrations::get_migrations() {
            let applied: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE name = $1)")
                    .bind(name)
                    .fetch_one(&self.pool)
                    .await?;

            if !applied {
                info!("Running migration: {}", name);
                sqlx::raw_sql(sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Migration(format!("{}: {}", name, e)))?;

                sqlx::query("INSERT INTO _migrations (name) VALUES ($1) ON CONFLICT DO NOTHING")
                    .bind(name)
                    .execute(&self.pool)
                    .await?;

                info!("Migration applied: {}", name);
            } else {
                debug!("Migration already applied: {}", name);
            }
        }

        Ok(())
    }

    // ========================================================================
    // Realm Tile Operations
    // ========================================================================

    /// All stored cells for a user, row-major
    pub async fn get_tiles(&self, user_id: &str) -> Result<Vec<TileRow>, StorageError> {
        let rows = sqlx::query_as::<_, TileRow>(&format!(
            "SELECT {TILE_COLUMNS} FROM realm_tiles WHERE user_id = $1 ORDER BY y, x"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Insert-or-ignore in a single statement; concurrent seeders collide
    /// on the primary key and the loser's rows are skipped.
    pub async fn insert_tiles_if_absent(
        &self,
        user_id: &str,
        cells: &[TileCell],
    ) -> Result<u64, StorageError> {
        if cells.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO realm_tiles (user_id, x, y, tile_type) ");
        builder.push_values(cells, |mut row, cell| {
            row.push_bind(user_id)
                .push_bind(cell.x)
                .push_bind(cell.y)
                .push_bind(i16::from(cell.tile_type.code()));
        });
        builder.push(" ON CONFLICT (user_id, x, y) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        debug!(
            "Inserted {} of {} tiles for {}",
            result.rows_affected(),
            cells.len(),
            user_id
        );
        Ok(result.rows_affected())
    }

    /// Upsert one cell keyed on (user_id, x, y)
    pub async fn upsert_tile(&self, user_id: &str, tile: &Tile) -> Result<TileRow, StorageError> {
        let row = sqlx::query_as::<_, TileRow>(&format!(
            "INSERT INTO realm_tiles (user_id, x, y, tile_type, event_type, meta, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             ON CONFLICT (user_id, x, y) DO UPDATE SET
                tile_type = EXCLUDED.tile_type,
                event_type = EXCLUDED.event_type,
                meta = EXCLUDED.meta,
                updated_at = NOW()
             RETURNING {TILE_COLUMNS}"
        ))
        .bind(user_id)
        .bind(tile.x)
        .bind(tile.y)
        .bind(i16::from(tile.tile_type.code()))
        .bind(tile.event_type.clone())
        .bind(tile.meta.clone())
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Upsert many cells in one statement. Keys must be distinct: a single
    /// `ON CONFLICT DO UPDATE` cannot touch the same row twice.
    pub async fn upsert_tiles(
        &self,
        user_id: &str,
        tiles: &[Tile],
    ) -> Result<Vec<TileRow>, StorageError> {
        if tiles.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO realm_tiles (user_id, x, y, tile_type, event_type, meta, updated_at) ",
        );
        builder.push_values(tiles, |mut row, tile| {
            row.push_bind(user_id)
                .push_bind(tile.x)
                .push_bind(tile.y)
                .push_bind(i16::from(tile.tile_type.code()))
                .push_bind(tile.event_type.clone())
                .push_bind(tile.meta.clone())
                .push("NOW()");
        });
        builder.push(format!(
            " ON CONFLICT (user_id, x, y) DO UPDATE SET
                tile_type = EXCLUDED.tile_type,
                event_type = EXCLUDED.event_type,
                meta = EXCLUDED.meta,
                updated_at = NOW()
             RETURNING {TILE_COLUMNS}"
        ));

        let rows = builder
            .build_query_as::<TileRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    // ========================================================================
    // Character Operations
    // ========================================================================

    pub async fn get_character(&self, user_id: &str) -> Result<Option<CharacterRow>, StorageError> {
        let row = sqlx::query_as::<_, CharacterRow>(&format!(
            "SELECT {CHARACTER_COLUMNS} FROM characters WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Add experience and gold (saturating); first reward creates the character
    pub async fn add_character_rewards(
        &self,
        user_id: &str,
        experience: i64,
        gold: i64,
    ) -> Result<CharacterRow, StorageError> {
        let row = sqlx::query_as::<_, CharacterRow>(&format!(
            "INSERT INTO characters (user_id, experience, gold, updated_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (user_id) DO UPDATE SET
                experience = LEAST(characters.experience::NUMERIC + EXCLUDED.experience, {BIGINT_MAX})::BIGINT,
                gold = LEAST(characters.gold::NUMERIC + EXCLUDED.gold, {BIGINT_MAX})::BIGINT,
                updated_at = NOW()
             RETURNING {CHARACTER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(experience)
        .bind(gold)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn set_character_experience(
        &self,
        user_id: &str,
        experience: i64,
    ) -> Result<CharacterRow, StorageError> {
        let row = sqlx::query_as::<_, CharacterRow>(&format!(
            "INSERT INTO characters (user_id, experience, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (user_id) DO UPDATE SET
                experience = EXCLUDED.experience,
                updated_at = NOW()
             RETURNING {CHARACTER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(experience)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Write the cached level unless experience moved on in the meantime
    pub async fn set_character_level(
        &self,
        user_id: &str,
        level: i32,
        experience: i64,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE characters SET level = $2
             WHERE user_id = $1 AND experience = $3",
        )
        .bind(user_id)
        .bind(level)
        .bind(experience)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Friendship Operations
    // ========================================================================

    /// Send friend request
    pub async fn send_friend_request(
        &self,
        user_id: &str,
        friend_id: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO friendships (user_id, friend_id, status)
             VALUES ($1, $2, 0)
             ON CONFLICT (user_id, friend_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(friend_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Accept the pending request `requester_id` sent to `user_id`
    pub async fn accept_friend_request(
        &self,
        user_id: &str,
        requester_id: &str,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE friendships SET status = 1
             WHERE user_id = $1 AND friend_id = $2 AND status = 0",
        )
        .bind(requester_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "No pending friend request from {}",
                requester_id
            )));
        }

        // Reverse relationship
        sqlx::query(
            "INSERT INTO friendships (user_id, friend_id, status) VALUES ($1, $2, 1)
             ON CONFLICT (user_id, friend_id) DO UPDATE SET status = 1",
        )
        .bind(user_id)
        .bind(requester_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn are_friends(&self, user_id: &str, other_id: &str) -> Result<bool, StorageError> {
        let accepted: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM friendships
                WHERE status = 1
                  AND ((user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1))
             )",
        )
        .bind(user_id)
        .bind(other_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(accepted)
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct TileRow {
    pub x: i32,
    pub y: i32,
    pub tile_type: i16,
    pub event_type: Option<String>,
    pub meta: Option<serde_json::Value>,
}

impl TryFrom<TileRow> for Tile {
    type Error = StorageError;

    fn try_from(row: TileRow) -> Result<Self, Self::Error> {
        let tile_type = TileType::from_code(i64::from(row.tile_type)).map_err(|e| {
            StorageError::Constraint(format!("realm tile ({}, {}): {}", row.x, row.y, e))
        })?;
        Ok(Tile {
            x: row.x,
            y: row.y,
            tile_type,
            event_type: row.event_type,
            meta: row.meta,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CharacterRow {
    pub user_id: String,
    pub experience: i64,
    pub level: i32,
    pub gold: i64,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<CharacterRow> for CharacterRecord {
    fn from(row: CharacterRow) -> Self {
        Self {
            user_id: row.user_id,
            experience: row.experience,
            level: row.level,
            gold: row.gold,
            updated_at: row.updated_at,
        }
    }
}
