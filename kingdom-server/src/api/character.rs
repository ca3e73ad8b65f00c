//! Character endpoints
//!
//! - GET  /character           level progress and gold
//! - POST /character/rewards   `{experience, gold?}`
//! - POST /character/restore   `{experience}`

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{parse_body, ApiError, ApiState};
use crate::character::{CharacterStatus, RewardOutcome};
use crate::identity::AuthUser;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/character", get(get_character))
        .route("/character/rewards", post(grant_reward))
        .route("/character/restore", post(restore))
}

#[derive(Deserialize)]
pub struct RewardRequest {
    pub experience: i64,
    #[serde(default)]
    pub gold: i64,
}

#[derive(Deserialize)]
pub struct RestoreRequest {
    pub experience: i64,
}

async fn get_character(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<CharacterStatus>, ApiError> {
    Ok(Json(state.characters.progress(&user_id).await?))
}

async fn grant_reward(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    body: Bytes,
) -> Result<Json<RewardOutcome>, ApiError> {
    let req: RewardRequest = parse_body(&body)?;
    let outcome = state
        .characters
        .grant_reward(&user_id, req.experience, req.gold)
        .await?;
    Ok(Json(outcome))
}

async fn restore(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    body: Bytes,
) -> Result<Json<CharacterStatus>, ApiError> {
    let req: RestoreRequest = parse_body(&body)?;
    Ok(Json(state.characters.restore(&user_id, req.experience).await?))
}
