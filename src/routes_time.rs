// --------------------------------------------------
// Handles API endpoints for time tracking.
//
// Thin layer over TimerEngine: parse input, pick the acting
// user, return the engine's outcome.
// -------------------------------------------------

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::timer::{StartTimer, StopTimer, TimeEntryPatch};

// -----------------------------
// POST /api/time-entries/start
// -----------------------------
pub async fn start_timer(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<StartTimer>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state.timer.start(user_id, input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

// -----------------------------
// POST /api/time-entries/stop
// Body is optional; an empty body stops at "now".
// A body that is present must parse.
// -----------------------------
pub async fn stop_timer(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let input = if body.iter().all(u8::is_ascii_whitespace) {
        StopTimer::default()
    } else {
        serde_json::from_slice::<StopTimer>(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid stop request: {e}")))?
    };
    let entry = state.timer.stop(user_id, input).await?;
    Ok(Json(entry))
}

// -----------------------------
// GET /api/time-entries/active
// Running entry with task / project, or null
// -----------------------------
pub async fn get_active(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let active = state.timer.active(user_id).await?;
    Ok(Json(active))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// -----------------------------
// GET /api/time-entries
// -----------------------------
pub async fn list_entries(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let entries = state.timer.list(user_id, q.limit, q.offset).await?;
    Ok(Json(entries))
}

// -----------------------------
// PUT /api/time-entries/:id
// -----------------------------
pub async fn update_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<TimeEntryPatch>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state.timer.edit(user_id, id, patch).await?;
    Ok(Json(entry))
}

// -----------------------------
// DELETE /api/time-entries/:id
// -----------------------------
pub async fn delete_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.timer.delete(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
