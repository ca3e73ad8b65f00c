//! API error mapping
//!
//! Every failure leaves the server as a status code plus `{"error": "..."}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use kingdom_core::tiles::TileError;

use crate::character::CharacterError;
use crate::realm::RealmError;
use crate::storage::repository::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error(transparent)]
    Storage(StorageError),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Storage(e) => {
                error!("Storage failure: {}", e);
                "internal storage error".to_string()
            }
            other => {
                warn!("Request rejected ({}): {}", status, other);
                other.to_string()
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Storage(other),
        }
    }
}

impl From<TileError> for ApiError {
    fn from(err: TileError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<RealmError> for ApiError {
    fn from(err: RealmError) -> Self {
        match err {
            RealmError::NotAuthorizedForViewer { .. } => ApiError::Forbidden(err.to_string()),
            RealmError::BatchTooLarge(_) => ApiError::Validation(err.to_string()),
            RealmError::Storage(e) => e.into(),
        }
    }
}

impl From<CharacterError> for ApiError {
    fn from(err: CharacterError) -> Self {
        match err {
            CharacterError::NegativeAmount(_) => ApiError::Validation(err.to_string()),
            CharacterError::Storage(e) => e.into(),
        }
    }
}
