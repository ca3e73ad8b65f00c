//! Realm grid service
//!
//! Sparse per-cell storage of each user's kingdom. A cell with no row is an
//! `empty` cell; seeding writes only the non-empty cells of the template.
//!
//! Lifecycle of a grid is `UNSEEDED -> SEEDED`. The transition happens on the
//! first own read that finds no rows. Seeding is a single insert-or-ignore
//! statement, so concurrent first reads degrade to no-op writes and a failed
//! seed leaves nothing behind (the next read simply tries again).

use std::sync::Arc;
use tracing::{debug, info, warn};

use kingdom_core::seed::seed_cells;
use kingdom_core::tiles::{collapse_batch, Tile};

use crate::events::{EventBus, KingdomEvent};
use crate::metrics::ServerMetrics;
use crate::storage::repository::{StorageError, StorageManager};

/// Upper bound on cells per batch write (each cell binds five parameters).
pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum RealmError {
    #[error("viewer {viewer} may not view realm of {owner}")]
    NotAuthorizedForViewer { owner: String, viewer: String },
    #[error("batch of {0} tiles exceeds the limit of {max}", max = MAX_BATCH_SIZE)]
    BatchTooLarge(usize),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type RealmResult<T> = Result<T, RealmError>;

#[derive(Clone)]
pub struct RealmService {
    storage: StorageManager,
    events: EventBus,
    metrics: Arc<ServerMetrics>,
}

impl RealmService {
    pub fn new(storage: StorageManager, events: EventBus, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            storage,
            events,
            metrics,
        }
    }

    /// All cells of the user's own realm, seeding it first if it has none.
    pub async fn read_tiles(&self, user_id: &str) -> RealmResult<Vec<Tile>> {
        let tiles = self.storage.tiles.list(user_id).await?;
        if !tiles.is_empty() {
            return Ok(tiles);
        }

        self.seed_from_template(user_id).await?;
        Ok(self.storage.tiles.list(user_id).await?)
    }

    /// Insert every non-empty template cell the user does not have yet.
    /// Returns the number of rows actually written.
    pub async fn seed_from_template(&self, user_id: &str) -> RealmResult<u64> {
        let cells = seed_cells();
        let inserted = self
            .storage
            .tiles
            .insert_missing(user_id, &cells)
            .await
            .map_err(|e| {
                warn!("Seeding realm for {} failed: {}", user_id, e);
                e
            })?;

        if inserted > 0 {
            info!("Seeded realm for {} ({} tiles)", user_id, inserted);
            self.metrics.record_realm_seeded();
            self.events.publish(KingdomEvent::RealmSeeded {
                user_id: user_id.to_string(),
                tiles: inserted,
            });
        } else {
            debug!("Realm for {} already seeded by a concurrent read", user_id);
        }
        Ok(inserted)
    }

    pub async fn upsert_tile(&self, user_id: &str, tile: Tile) -> RealmResult<Tile> {
        let stored = self.storage.tiles.upsert(user_id, &tile).await?;
        debug!(
            "Placed {} at ({}, {}) for {}",
            stored.tile_type, stored.x, stored.y, user_id
        );
        self.record_placed(user_id, 1);
        Ok(stored)
    }

    /// Write many cells in one round trip. A cell written twice keeps the
    /// later write.
    pub async fn upsert_tiles_batch(
        &self,
        user_id: &str,
        tiles: Vec<Tile>,
    ) -> RealmResult<Vec<Tile>> {
        if tiles.len() > MAX_BATCH_SIZE {
            return Err(RealmError::BatchTooLarge(tiles.len()));
        }
        let tiles = collapse_batch(tiles);
        if tiles.is_empty() {
            return Ok(Vec::new());
        }

        let stored = self.storage.tiles.upsert_many(user_id, &tiles).await?;
        debug!("Placed {} tiles for {}", stored.len(), user_id);
        self.record_placed(user_id, stored.len());
        Ok(stored)
    }

    /// Read someone's realm on behalf of `viewer_id`.
    ///
    /// Reading one's own realm is `read_tiles`. A foreign realm is only
    /// returned to an accepted friend and is never seeded.
    pub async fn read_tiles_for_viewer(
        &self,
        owner_id: &str,
        viewer_id: &str,
    ) -> RealmResult<Vec<Tile>> {
        if owner_id == viewer_id {
            return self.read_tiles(owner_id).await;
        }

        if !self
            .storage
            .friendships
            .are_friends(owner_id, viewer_id)
            .await?
        {
            return Err(RealmError::NotAuthorizedForViewer {
                owner: owner_id.to_string(),
                viewer: viewer_id.to_string(),
            });
        }

        Ok(self.storage.tiles.list(owner_id).await?)
    }

    fn record_placed(&self, user_id: &str, count: usize) {
        self.metrics.record_tiles_written(count as u64);
        self.events.publish(KingdomEvent::TilesPlaced {
            user_id: user_id.to_string(),
            count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::storage::repository::FriendshipRepo;
    use kingdom_core::seed::{seed_cell_count, seed_cells};
    use kingdom_core::tiles::TileType;

    fn service() -> (RealmService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let realm = RealmService::new(
            StorageManager::memory(store.clone()),
            EventBus::default(),
            ServerMetrics::new(),
        );
        (realm, store)
    }

    #[tokio::test]
    async fn test_first_read_seeds_template() {
        let (realm, store) = service();
        let tiles = realm.read_tiles("alice").await.unwrap();
        assert_eq!(tiles.len(), seed_cell_count());
        assert!(tiles.iter().all(|t| !t.tile_type.is_empty()));

        let again = realm.read_tiles("alice").await.unwrap();
        assert_eq!(tiles, again);
        assert_eq!(store.tile_count("alice"), seed_cell_count());
    }

    #[tokio::test]
    async fn test_existing_realm_is_not_reseeded() {
        let (realm, _store) = service();
        realm
            .upsert_tile("bob", Tile::new(4, 4, TileType::Castle))
            .await
            .unwrap();
        let tiles = realm.read_tiles("bob").await.unwrap();
        assert_eq!(tiles, vec![Tile::new(4, 4, TileType::Castle)]);
    }

    #[tokio::test]
    async fn test_failed_seed_retries_on_next_read() {
        let (realm, store) = service();
        store.set_unavailable(true);
        assert!(realm.read_tiles("carol").await.is_err());
        assert_eq!(store.tile_count("carol"), 0);

        store.set_unavailable(false);
        let tiles = realm.read_tiles("carol").await.unwrap();
        assert_eq!(tiles.len(), seed_cell_count());
    }

    #[tokio::test]
    async fn test_later_batch_overrides_earlier() {
        let (realm, _store) = service();
        realm
            .upsert_tiles_batch(
                "dave",
                vec![
                    Tile::new(1, 1, TileType::Grass),
                    Tile::new(2, 2, TileType::Water),
                ],
            )
            .await
            .unwrap();
        realm
            .upsert_tiles_batch("dave", vec![Tile::new(1, 1, TileType::Forest)])
            .await
            .unwrap();

        let tiles = realm.read_tiles("dave").await.unwrap();
        assert_eq!(
            tiles,
            vec![
                Tile::new(1, 1, TileType::Forest),
                Tile::new(2, 2, TileType::Water),
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_cell_in_batch_keeps_last() {
        let (realm, _store) = service();
        let stored = realm
            .upsert_tiles_batch(
                "erin",
                vec![
                    Tile::new(3, 0, TileType::Grass),
                    Tile::new(3, 0, TileType::Cave),
                ],
            )
            .await
            .unwrap();
        assert_eq!(stored, vec![Tile::new(3, 0, TileType::Cave)]);
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected() {
        let (realm, store) = service();
        let tiles = (0..=MAX_BATCH_SIZE as i32)
            .map(|i| Tile::new(i % 1000, i / 1000, TileType::Grass))
            .collect();
        assert!(matches!(
            realm.upsert_tiles_batch("frank", tiles).await,
            Err(RealmError::BatchTooLarge(_))
        ));
        assert_eq!(store.tile_count("frank"), 0);
    }

    #[tokio::test]
    async fn test_stranger_cannot_view_realm() {
        let (realm, store) = service();
        let result = realm.read_tiles_for_viewer("gina", "hank").await;
        assert!(matches!(
            result,
            Err(RealmError::NotAuthorizedForViewer { .. })
        ));
        assert_eq!(store.tile_count("gina"), 0);
    }

    #[tokio::test]
    async fn test_friend_view_never_seeds() {
        let (realm, store) = service();
        store.send_request("ivy", "jack").await.unwrap();
        store.accept_request("jack", "ivy").await.unwrap();

        let tiles = realm.read_tiles_for_viewer("ivy", "jack").await.unwrap();
        assert!(tiles.is_empty());
        assert_eq!(store.tile_count("ivy"), 0);

        realm.read_tiles("ivy").await.unwrap();
        let tiles = realm.read_tiles_for_viewer("ivy", "jack").await.unwrap();
        assert_eq!(tiles.len(), seed_cell_count());
    }

    #[tokio::test]
    async fn test_own_view_seeds() {
        let (realm, _store) = service();
        let tiles = realm.read_tiles_for_viewer("kim", "kim").await.unwrap();
        assert_eq!(tiles.len(), seed_cell_count());
    }

    fn template_tiles() -> Vec<Tile> {
        let mut tiles: Vec<Tile> = seed_cells().into_iter().map(Tile::from).collect();
        tiles.sort_by_key(|t| (t.y, t.x));
        tiles
    }

    fn seeded_events(rx: &mut tokio::sync::broadcast::Receiver<KingdomEvent>) -> usize {
        let mut seeded = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, KingdomEvent::RealmSeeded { .. }) {
                seeded += 1;
            }
        }
        seeded
    }

    #[tokio::test]
    async fn test_concurrent_first_reads_seed_once() {
        let (realm, store) = service();
        let mut rx = realm.events.subscribe();

        let (a, b) = tokio::join!(realm.read_tiles("uma"), realm.read_tiles("uma"));
        let (mut a, mut b) = (a.unwrap(), b.unwrap());
        a.sort_by_key(|t| (t.y, t.x));
        b.sort_by_key(|t| (t.y, t.x));

        assert_eq!(a, template_tiles());
        assert_eq!(b, template_tiles());
        assert_eq!(store.tile_count("uma"), seed_cell_count());
        assert_eq!(seeded_events(&mut rx), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_first_reads_seed_once() {
        let (realm, store) = service();
        let mut rx = realm.events.subscribe();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let realm = realm.clone();
                tokio::spawn(async move { realm.read_tiles("vic").await })
            })
            .collect();
        for handle in handles {
            let mut tiles = handle.await.unwrap().unwrap();
            tiles.sort_by_key(|t| (t.y, t.x));
            assert_eq!(tiles, template_tiles());
        }

        assert_eq!(store.tile_count("vic"), seed_cell_count());
        assert_eq!(seeded_events(&mut rx), 1);
    }

    #[tokio::test]
    async fn test_seed_publishes_event() {
        let (realm, _store) = service();
        let mut events = realm.events.subscribe();
        realm.read_tiles("lee").await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            KingdomEvent::RealmSeeded {
                user_id: "lee".into(),
                tiles: seed_cell_count() as u64,
            }
        );
    }
}
