//! Friendship endpoints
//!
//! - POST /friends/{friendId}          send a request to `friendId`
//! - POST /friends/{friendId}/accept   accept the pending request from `friendId`

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use tracing::info;

use super::{ApiError, ApiState, SuccessResponse};
use crate::identity::AuthUser;

const MAX_USER_ID_LEN: usize = 128;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/friends/{friend_id}", post(send_request))
        .route("/friends/{friend_id}/accept", post(accept_request))
}

fn check_friend_id(user_id: &str, friend_id: &str) -> Result<(), ApiError> {
    if friend_id.is_empty() || friend_id.len() > MAX_USER_ID_LEN {
        return Err(ApiError::Validation("invalid friend id".into()));
    }
    if friend_id == user_id {
        return Err(ApiError::Validation("cannot befriend yourself".into()));
    }
    Ok(())
}

async fn send_request(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    Path(friend_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    check_friend_id(&user_id, &friend_id)?;
    state
        .storage
        .friendships
        .send_request(&user_id, &friend_id)
        .await?;
    info!("{} sent a friend request to {}", user_id, friend_id);
    Ok(Json(SuccessResponse { success: true }))
}

async fn accept_request(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    Path(friend_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    check_friend_id(&user_id, &friend_id)?;
    state
        .storage
        .friendships
        .accept_request(&user_id, &friend_id)
        .await?;
    info!("{} accepted {} as a friend", user_id, friend_id);
    Ok(Json(SuccessResponse { success: true }))
}
