// --------------------------------------------------
// Error taxonomy shared by the ownership guard, the timer
// engine and the HTTP handlers.
//
// Domain rejections are plain variants; storage failures are
// wrapped in `Internal` and never reported as a rejection.
// --------------------------------------------------

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ResourceKind;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(ResourceKind),

    #[error("not allowed to access this resource")]
    Forbidden,

    #[error("a timer is already running ({active_entry_id})")]
    ConflictActiveTimer { active_entry_id: Uuid },

    #[error("no active timer")]
    NoActiveTimer,

    #[error("end_time must not be before start_time")]
    InvalidTimeRange,

    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("storage error: {0}")]
    Internal(#[from] sqlx::Error),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden => "forbidden",
            AppError::ConflictActiveTimer { .. } => "conflict_active_timer",
            AppError::NoActiveTimer => "no_active_timer",
            AppError::InvalidTimeRange => "invalid_time_range",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::NoActiveTimer => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::ConflictActiveTimer { .. } => StatusCode::CONFLICT,
            AppError::InvalidTimeRange | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Internal(err) => {
                tracing::error!(error = %err, "request failed on storage");
                json!({ "error": self.code(), "message": "internal server error" })
            }
            AppError::ConflictActiveTimer { active_entry_id } => json!({
                "error": self.code(),
                "message": self.to_string(),
                "active_entry_id": active_entry_id,
            }),
            _ => json!({ "error": self.code(), "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(AppError::NotFound(ResourceKind::Task).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NoActiveTimer.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::ConflictActiveTimer { active_entry_id: Uuid::nil() }.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::InvalidTimeRange.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Internal(sqlx::Error::PoolTimedOut).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_names_the_resource() {
        assert_eq!(
            AppError::NotFound(ResourceKind::TimeEntry).to_string(),
            "time_entry not found"
        );
    }
}
