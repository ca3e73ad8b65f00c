//! Kingdom event bus
//!
//! Services publish what happened (level ups, seeded realms, placed tiles)
//! and any number of subscribers consume it. Built once at startup and
//! handed around through `ApiState`.
//!
//! ```text
//! RealmService / CharacterService
//!       │ publish()
//!       ▼
//! broadcast::Sender<KingdomEvent> ──► subscriber (log_events)
//!                                 └─► subscriber (tests, future push channels)
//! ```

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KingdomEvent {
    LevelUp {
        user_id: String,
        old_level: u32,
        new_level: u32,
    },
    RealmSeeded {
        user_id: String,
        tiles: u64,
    },
    TilesPlaced {
        user_id: String,
        count: usize,
    },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<KingdomEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KingdomEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of subscribers reached. Zero subscribers is fine.
    pub fn publish(&self, event: KingdomEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "No event subscribers");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Log every event until the bus closes.
pub async fn log_events(mut receiver: broadcast::Receiver<KingdomEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => info!(event = ?event, "kingdom event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event logger lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
