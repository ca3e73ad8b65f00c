//! HTTP/JSON API Layer
//!
//! ## Architecture
//! ```text
//! Kingdom client (fetch, bearer token)
//!       ↓ HTTP, JSON body
//! Axum Router (trace → cors → metrics → timeout)
//!       ↓
//! Handlers (realm_tiles, character, friends)
//!       ↓
//! RealmService / CharacterService
//!       ↓
//! StorageManager (PostgreSQL or memory)
//! ```
//!
//! Every handler authenticates through [`AuthUser`](crate::identity::AuthUser)
//! and reports failures as [`ApiError`].

pub mod character;
pub mod error;
pub mod friends;
pub mod realm_tiles;

pub use error::ApiError;

use axum::{
    body::Bytes,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use kingdom_core::leveling::LevelCurve;

use crate::character::CharacterService;
use crate::events::EventBus;
use crate::identity::SharedIdentity;
use crate::metrics::ServerMetrics;
use crate::realm::RealmService;
use crate::storage::repository::StorageManager;

/// Shared state available to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub storage: StorageManager,
    pub realm: RealmService,
    pub characters: CharacterService,
    pub identity: SharedIdentity,
    /// Server-wide metrics (lock-free atomics)
    pub metrics: Arc<ServerMetrics>,
    pub request_timeout: Duration,
}

impl ApiState {
    pub fn new(
        storage: StorageManager,
        identity: SharedIdentity,
        curve: LevelCurve,
        events: EventBus,
    ) -> Self {
        let metrics = ServerMetrics::new();
        Self {
            realm: RealmService::new(storage.clone(), events.clone(), metrics.clone()),
            characters: CharacterService::new(
                storage.clone(),
                curve,
                events.clone(),
                metrics.clone(),
            ),
            storage,
            identity,
            metrics,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Parse a JSON request body, reporting malformed input as a 400.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("invalid JSON body: {}", e)))
}

/// Build the full API router with all service endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(crate::metrics::prometheus_handler))
        .route("/metrics/json", get(crate::metrics::json_metrics_handler))
        .merge(realm_tiles::routes())
        .merge(character::routes())
        .merge(friends::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            timeout_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::metrics::metrics_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Answer 408 with the usual error body once a handler outlives
/// `request_timeout`. Dropping the handler future cancels its storage call.
async fn timeout_middleware(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(state.request_timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => ApiError::Timeout(state.request_timeout).into_response(),
    }
}

/// Serve the API on `port` until ctrl-c.
pub async fn start_api_server(
    state: ApiState,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
