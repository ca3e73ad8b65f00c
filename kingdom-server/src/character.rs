//! Character rewards
//!
//! Stored experience is the ledger; the level is always recomputed with the
//! leveling engine and only cached on the row.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use kingdom_core::leveling::{LevelCurve, LevelProgress};

use crate::events::{EventBus, KingdomEvent};
use crate::metrics::ServerMetrics;
use crate::storage::repository::{CharacterRecord, StorageError, StorageManager};

#[derive(Debug, thiserror::Error)]
pub enum CharacterError {
    #[error("{0} must not be negative")]
    NegativeAmount(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type CharacterResult<T> = Result<T, CharacterError>;

/// Progress plus balance, as returned by the character endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterStatus {
    #[serde(flatten)]
    pub progress: LevelProgress,
    pub gold: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardOutcome {
    #[serde(flatten)]
    pub status: CharacterStatus,
    pub leveled_up: bool,
    pub levels_gained: u32,
}

#[derive(Clone)]
pub struct CharacterService {
    storage: StorageManager,
    curve: LevelCurve,
    events: EventBus,
    metrics: Arc<ServerMetrics>,
}

impl CharacterService {
    pub fn new(
        storage: StorageManager,
        curve: LevelCurve,
        events: EventBus,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            storage,
            curve,
            events,
            metrics,
        }
    }

    pub fn curve(&self) -> &LevelCurve {
        &self.curve
    }

    /// Current status. A user without a character row has 0 experience.
    pub async fn progress(&self, user_id: &str) -> CharacterResult<CharacterStatus> {
        let record = self.storage.characters.get(user_id).await?;
        let (experience, gold) = record.map_or((0, 0), |r| (r.experience, r.gold));
        Ok(CharacterStatus {
            progress: self.curve.progress(experience),
            gold,
        })
    }

    pub async fn grant_reward(
        &self,
        user_id: &str,
        experience: i64,
        gold: i64,
    ) -> CharacterResult<RewardOutcome> {
        if experience < 0 {
            return Err(CharacterError::NegativeAmount("experience"));
        }
        if gold < 0 {
            return Err(CharacterError::NegativeAmount("gold"));
        }

        let record = self
            .storage
            .characters
            .add_rewards(user_id, experience, gold)
            .await?;
        self.metrics.record_reward();

        // a saturated total hides the previous balance; use the cached level
        let levels_gained = if record.experience == i64::MAX {
            let cached = u32::try_from(record.level).unwrap_or(1).max(1);
            self.curve
                .level_from_experience(record.experience)
                .saturating_sub(cached)
        } else {
            self.curve
                .levels_gained(record.experience - experience, record.experience)
        };
        let status = self.refresh_level(&record).await?;

        if levels_gained > 0 {
            let old_level = status.progress.level - levels_gained;
            info!(
                "{} leveled up {} -> {}",
                user_id, old_level, status.progress.level
            );
            self.events.publish(KingdomEvent::LevelUp {
                user_id: user_id.to_string(),
                old_level,
                new_level: status.progress.level,
            });
        }

        Ok(RewardOutcome {
            status,
            leveled_up: levels_gained > 0,
            levels_gained,
        })
    }

    /// Set experience back to a previously earned total.
    pub async fn restore(
        &self,
        user_id: &str,
        experience: i64,
    ) -> CharacterResult<CharacterStatus> {
        if experience < 0 {
            return Err(CharacterError::NegativeAmount("experience"));
        }
        let record = self
            .storage
            .characters
            .set_experience(user_id, experience)
            .await?;
        info!("Restored {} to {} experience", user_id, experience);
        self.refresh_level(&record).await
    }

    async fn refresh_level(&self, record: &CharacterRecord) -> CharacterResult<CharacterStatus> {
        let progress = self.curve.progress(record.experience);
        let level = i32::try_from(progress.level).unwrap_or(i32::MAX);
        if level != record.level {
            let stored = self
                .storage
                .characters
                .cache_level(&record.user_id, level, record.experience)
                .await?;
            if !stored {
                debug!(
                    "Skipped stale level cache for {} (experience moved on)",
                    record.user_id
                );
            }
        }
        Ok(CharacterStatus {
            progress,
            gold: record.gold,
        })
    }
}
