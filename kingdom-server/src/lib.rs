//! Kingdom Server Library
//!
//! Modules behind the kingdom HTTP service:
//! - Realm grid persistence with lazy seeding from the starting template
//! - Character rewards driven by the shared leveling curve
//! - Friend-gated realm viewing
//! - PostgreSQL and in-memory storage backends
//! - Bearer identity, event bus, metrics and configuration

pub mod api; // HTTP/JSON endpoints
pub mod character; // Experience and gold rewards
pub mod config; // Layered server configuration (RON + env)
pub mod events; // Broadcast event bus
pub mod identity; // Bearer token resolution
pub mod metrics; // Server metrics (Prometheus + JSON export)
pub mod realm; // Realm grid service
pub mod storage; // Unified data storage (PostgreSQL + memory)

// Re-export commonly used types
pub use api::{build_router, ApiError, ApiState};
pub use config::ServerConfig;
pub use events::{EventBus, KingdomEvent};
pub use identity::{IdentityProvider, SignedTokenIdentity};
pub use realm::{RealmError, RealmService};
pub use storage::memory::MemoryStore;
pub use storage::postgres::PostgresStore;
pub use storage::repository::StorageManager;
