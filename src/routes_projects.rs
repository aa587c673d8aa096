// --------------------------------------------------
// Handles API endpoints for users, projects and goals.
//
// Responsibilities:
// - Register a user (credentials are handled elsewhere)
// - Create / list / delete projects
// - Create / delete goals
// -------------------------------------------------

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, is_unique_violation};
use crate::logic;
use crate::models::ResourceKind;
use crate::ownership;
use crate::store;

#[derive(Debug, Deserialize)]
pub struct CreateUserInput {
    pub email: String,
}

// -----------------------------
// POST /api/users
// Registers a user
// -----------------------------
pub async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<CreateUserInput>,
) -> Result<impl IntoResponse, AppError> {
    let email = input.email.trim().to_ascii_lowercase();
    if !email.contains('@') {
        return Err(AppError::BadRequest("invalid email".into()));
    }

    let mut conn = state.pool.acquire().await?;
    let user = match store::create_user(&mut conn, &email).await {
        Ok(user) => user,
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::BadRequest("email already registered".into()));
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectInput {
    pub name: String,
    pub color: Option<String>, // "#RRGGBB"
}

// -----------------------------
// GET /api/projects
// Lists the caller's projects
// -----------------------------
pub async fn list_projects(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.pool.acquire().await?;
    let projects = store::list_projects(&mut conn, user_id).await?;
    Ok(Json(projects))
}

// -----------------------------
// POST /api/projects
// Creates a project owned by the caller
// -----------------------------
pub async fn create_project(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<CreateProjectInput>,
) -> Result<impl IntoResponse, AppError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name required".into()));
    }
    let color = logic::validate_color(input.color.as_deref())?;

    let mut conn = state.pool.acquire().await?;
    let project = store::create_project(&mut conn, user_id, name, &color).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

// -----------------------------
// DELETE /api/projects/:id
// Removes a project with its tasks and time entries
// -----------------------------
pub async fn delete_project(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = store::begin_write(&state.pool).await?;
    ownership::require_owner(&mut *tx, ResourceKind::Project, id, user_id).await?;
    store::delete_project(&mut *tx, id).await?;
    tx.commit().await?;

    tracing::info!(%user_id, project_id = %id, "project deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateGoalInput {
    pub title: String,
    pub target_hours: Option<i64>,
}

// -----------------------------
// POST /api/goals
// -----------------------------
pub async fn create_goal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<CreateGoalInput>,
) -> Result<impl IntoResponse, AppError> {
    let title = logic::validate_title(&input.title)?;
    if input.target_hours.is_some_and(|h| h <= 0) {
        return Err(AppError::BadRequest("target_hours must be positive".into()));
    }

    let mut conn = state.pool.acquire().await?;
    let goal = store::create_goal(&mut conn, user_id, &title, input.target_hours).await?;
    Ok((StatusCode::CREATED, Json(goal)))
}

// -----------------------------
// DELETE /api/goals/:id
// -----------------------------
pub async fn delete_goal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = store::begin_write(&state.pool).await?;
    ownership::require_owner(&mut *tx, ResourceKind::Goal, id, user_id).await?;
    store::delete_goal(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
