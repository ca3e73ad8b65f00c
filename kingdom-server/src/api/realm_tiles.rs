//! Realm tiles endpoints
//!
//! - GET  /realm-tiles?userId=<optional>  own realm (seeded on first read) or a friend's
//! - POST /realm-tiles                    one cell object, or an array of them

use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use kingdom_core::tiles::Tile;

use super::{parse_body, ApiError, ApiState};
use crate::identity::AuthUser;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/realm-tiles", get(get_tiles).post(place_tiles))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct RealmQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// One cell write as it arrives on the wire, before validation.
#[derive(Deserialize)]
pub struct TileWriteRequest {
    pub x: i64,
    pub y: i64,
    pub tile_type: i64,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
}

impl TryFrom<TileWriteRequest> for Tile {
    type Error = ApiError;

    fn try_from(req: TileWriteRequest) -> Result<Self, Self::Error> {
        let meta = match req.meta {
            None | Some(Value::Null) => None,
            Some(meta @ Value::Object(_)) => Some(meta),
            Some(_) => return Err(ApiError::Validation("meta must be an object".into())),
        };
        Ok(Tile::from_raw(
            req.x,
            req.y,
            req.tile_type,
            req.event_type,
            meta,
        )?)
    }
}

#[derive(Serialize)]
pub struct TilesResponse {
    pub tiles: Vec<Tile>,
}

#[derive(Serialize)]
pub struct PlaceTilesResponse {
    pub success: bool,
    pub tiles: Vec<Tile>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_tiles(
    State(state): State<ApiState>,
    AuthUser(viewer): AuthUser,
    Query(query): Query<RealmQuery>,
) -> Result<Json<TilesResponse>, ApiError> {
    let tiles = match query.user_id.filter(|id| !id.is_empty()) {
        Some(owner) => state.realm.read_tiles_for_viewer(&owner, &viewer).await?,
        None => state.realm.read_tiles(&viewer).await?,
    };
    Ok(Json(TilesResponse { tiles }))
}

async fn place_tiles(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    body: Bytes,
) -> Result<Json<PlaceTilesResponse>, ApiError> {
    let tiles = match parse_body::<Value>(&body)? {
        Value::Array(items) => {
            let writes = items
                .into_iter()
                .map(parse_write)
                .collect::<Result<Vec<_>, _>>()?;
            debug!("Batch of {} tile writes from {}", writes.len(), user_id);
            state.realm.upsert_tiles_batch(&user_id, writes).await?
        }
        item @ Value::Object(_) => {
            let write = parse_write(item)?;
            vec![state.realm.upsert_tile(&user_id, write).await?]
        }
        _ => {
            return Err(ApiError::Validation(
                "body must be a tile object or an array of tile objects".into(),
            ))
        }
    };

    Ok(Json(PlaceTilesResponse {
        success: true,
        tiles,
    }))
}

fn parse_write(item: Value) -> Result<Tile, ApiError> {
    let req: TileWriteRequest = serde_json::from_value(item)
        .map_err(|e| ApiError::Validation(format!("invalid tile: {}", e)))?;
    Tile::try_from(req)
}
