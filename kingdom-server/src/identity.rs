//! Bearer identity
//!
//! Resolves the `Authorization: Bearer <token>` header to a stable user id.
//! Tokens are `<user_id>.<hex sha3-256(secret || user_id)>`.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use sha3::{Digest, Sha3_256};
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

use crate::api::{ApiError, ApiState};

pub trait IdentityProvider: Send + Sync {
    /// User id behind `token`, or `None` when the token is not valid.
    fn resolve(&self, token: &str) -> Option<String>;
}

pub type SharedIdentity = Arc<dyn IdentityProvider>;

pub struct SignedTokenIdentity {
    secret: Vec<u8>,
}

impl SignedTokenIdentity {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn signature(&self, user_id: &str) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(&self.secret);
        hasher.update(user_id.as_bytes());
        let digest = hasher.finalize();

        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{:02x}", byte);
        }
        hex
    }

    /// Issue a token for `user_id`.
    pub fn sign(&self, user_id: &str) -> String {
        format!("{}.{}", user_id, self.signature(user_id))
    }
}

impl IdentityProvider for SignedTokenIdentity {
    fn resolve(&self, token: &str) -> Option<String> {
        let (user_id, signature) = token.rsplit_once('.')?;
        if user_id.is_empty() {
            return None;
        }
        let expected = self.signature(user_id);
        // Compare every byte regardless of where the first mismatch is
        let matches = expected.len() == signature.len()
            && expected
                .bytes()
                .zip(signature.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0;
        matches.then(|| user_id.to_string())
    }
}

/// Authenticated caller, extracted from the bearer header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("missing bearer token"))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::Unauthorized("missing bearer token"))?;

        match state.identity.resolve(token) {
            Some(user_id) => Ok(AuthUser(user_id)),
            None => {
                debug!("Rejected bearer token for {}", parts.uri.path());
                Err(ApiError::Unauthorized("invalid bearer token"))
            }
        }
    }
}
