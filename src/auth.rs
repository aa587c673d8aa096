// --------------------------------------------------
// Authentication collaborator.
//
// Token issuance lives elsewhere; this service only verifies a
// bearer token and learns which user is acting.
// --------------------------------------------------

use std::collections::HashMap;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Uuid, TokenError>;
}

/// What a configured token grants: the acting user, until an optional deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenGrant {
    pub user_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Fixed token table loaded from configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticTokens {
    tokens: HashMap<String, TokenGrant>,
}

impl StaticTokens {
    pub fn new(tokens: HashMap<String, TokenGrant>) -> Self {
        Self { tokens }
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, TokenError> {
        let grant = self.tokens.get(token).ok_or(TokenError::Invalid)?;
        match grant.expires_at {
            Some(expires_at) if expires_at <= now => Err(TokenError::Expired),
            _ => Ok(grant.user_id),
        }
    }
}

impl TokenVerifier for StaticTokens {
    fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        self.verify_at(token, Utc::now())
    }
}

/// The acting user, taken from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AppError::Unauthorized)?;

        match state.tokens.verify(token) {
            Ok(user_id) => Ok(AuthUser(user_id)),
            Err(err) => {
                tracing::debug!(error = %err, "rejected bearer token");
                Err(AppError::Unauthorized)
            }
        }
    }
}
