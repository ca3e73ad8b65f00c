//! In-memory storage backend
//!
//! Same contract as the PostgreSQL adapters, kept in process behind
//! `parking_lot` locks. Backs the test suites and `KINGDOM_MEMORY_STORE=1`
//! development runs. Each operation takes one lock for its whole duration,
//! which gives it the same atomicity as the single SQL statement it mirrors.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use kingdom_core::tiles::{Tile, TileCell};

use super::repository::*;

const PENDING: u8 = 0;
const ACCEPTED: u8 = 1;

/// Realm cells keyed by (y, x) so iteration is row-major
type Realm = BTreeMap<(i32, i32), Tile>;

#[derive(Default)]
pub struct MemoryStore {
    realms: RwLock<HashMap<String, Realm>>,
    characters: RwLock<HashMap<String, CharacterRecord>>,
    friendships: RwLock<HashMap<(String, String), u8>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following operation fail until switched back (outage drills).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> RepoResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    /// Number of stored cells for a user
    pub fn tile_count(&self, user_id: &str) -> usize {
        self.realms.read().get(user_id).map_or(0, |realm| realm.len())
    }
}

#[async_trait]
impl TileRepo for MemoryStore {
    async fn list(&self, user_id: &str) -> RepoResult<Vec<Tile>> {
        self.check_available()?;
        Ok(self
            .realms
            .read()
            .get(user_id)
            .map(|realm| realm.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_missing(&self, user_id: &str, cells: &[TileCell]) -> RepoResult<u64> {
        self.check_available()?;
        let mut realms = self.realms.write();
        let realm = realms.entry(user_id.to_string()).or_default();
        let mut inserted = 0;
        for cell in cells {
            realm.entry((cell.y, cell.x)).or_insert_with(|| {
                inserted += 1;
                Tile::from(*cell)
            });
        }
        Ok(inserted)
    }

    async fn upsert(&self, user_id: &str, tile: &Tile) -> RepoResult<Tile> {
        self.check_available()?;
        self.realms
            .write()
            .entry(user_id.to_string())
            .or_default()
            .insert((tile.y, tile.x), tile.clone());
        Ok(tile.clone())
    }

    async fn upsert_many(&self, user_id: &str, tiles: &[Tile]) -> RepoResult<Vec<Tile>> {
        self.check_available()?;
        let mut realms = self.realms.write();
        let realm = realms.entry(user_id.to_string()).or_default();
        for tile in tiles {
            realm.insert((tile.y, tile.x), tile.clone());
        }
        Ok(tiles.to_vec())
    }
}

#[async_trait]
impl CharacterRepo for MemoryStore {
    async fn get(&self, user_id: &str) -> RepoResult<Option<CharacterRecord>> {
        self.check_available()?;
        Ok(self.characters.read().get(user_id).cloned())
    }

    async fn add_rewards(
        &self,
        user_id: &str,
        experience: i64,
        gold: i64,
    ) -> RepoResult<CharacterRecord> {
        self.check_available()?;
        let mut characters = self.characters.write();
        let record = characters
            .entry(user_id.to_string())
            .or_insert_with(|| new_character(user_id));
        let new_experience = record.experience.saturating_add(experience);
        let new_gold = record.gold.saturating_add(gold);
        if new_experience < 0 || new_gold < 0 {
            return Err(StorageError::Constraint(
                "experience and gold must stay non-negative".to_string(),
            ));
        }
        record.experience = new_experience;
        record.gold = new_gold;
        record.updated_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn set_experience(&self, user_id: &str, experience: i64) -> RepoResult<CharacterRecord> {
        self.check_available()?;
        if experience < 0 {
            return Err(StorageError::Constraint(
                "experience must stay non-negative".to_string(),
            ));
        }
        let mut characters = self.characters.write();
        let record = characters
            .entry(user_id.to_string())
            .or_insert_with(|| new_character(user_id));
        record.experience = experience;
        record.updated_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn cache_level(&self, user_id: &str, level: i32, experience: i64) -> RepoResult<bool> {
        self.check_available()?;
        let mut characters = self.characters.write();
        match characters.get_mut(user_id) {
            Some(record) if record.experience == experience => {
                record.level = level;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn new_character(user_id: &str) -> CharacterRecord {
    CharacterRecord {
        user_id: user_id.to_string(),
        experience: 0,
        level: 1,
        gold: 0,
        updated_at: Some(Utc::now()),
    }
}

#[async_trait]
impl FriendshipRepo for MemoryStore {
    async fn send_request(&self, user_id: &str, friend_id: &str) -> RepoResult<()> {
        self.check_available()?;
        if user_id == friend_id {
            return Err(StorageError::Constraint(
                "cannot befriend yourself".to_string(),
            ));
        }
        self.friendships
            .write()
            .entry((user_id.to_string(), friend_id.to_string()))
            .or_insert(PENDING);
        Ok(())
    }

    async fn accept_request(&self, user_id: &str, requester_id: &str) -> RepoResult<()> {
        self.check_available()?;
        let mut friendships = self.friendships.write();
        match friendships.get_mut(&(requester_id.to_string(), user_id.to_string())) {
            Some(status) if *status == PENDING => *status = ACCEPTED,
            _ => {
                return Err(StorageError::NotFound(format!(
                    "No pending friend request from {}",
                    requester_id
                )))
            }
        }
        friendships.insert((user_id.to_string(), requester_id.to_string()), ACCEPTED);
        Ok(())
    }

    async fn are_friends(&self, user_id: &str, other_id: &str) -> RepoResult<bool> {
        self.check_available()?;
        let friendships = self.friendships.read();
        let accepted = |a: &str, b: &str| {
            friendships.get(&(a.to_string(), b.to_string())) == Some(&ACCEPTED)
        };
        Ok(accepted(user_id, other_id) || accepted(other_id, user_id))
    }
}
