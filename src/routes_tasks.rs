// --------------------------------------------------
// Handles API endpoints related to task CRUD operations.
//
// Responsibilities:
// - Create a task inside a project
// - Read / update / delete tasks
// - Keep completed_at in step with status changes
// -------------------------------------------------

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::logic;
use crate::models::{Priority, ResourceKind, TaskStatus, present};
use crate::ownership;
use crate::store;

#[derive(Debug, Deserialize)]
pub struct CreateTaskInput {
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    pub due_date: Option<NaiveDate>, // "YYYY-MM-DD"
}

// -----------------------------
// POST /api/projects/:id/tasks
// Creates a new task in the caller's project
// -----------------------------
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(project_id): Path<Uuid>,
    Json(input): Json<CreateTaskInput>,
) -> Result<impl IntoResponse, AppError> {
    let title = logic::validate_title(&input.title)?;

    let mut tx = store::begin_write(&state.pool).await?;
    ownership::require_owner(&mut *tx, ResourceKind::Project, project_id, user_id).await?;
    let task =
        store::create_task(&mut *tx, project_id, &title, input.priority, input.due_date).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(task)))
}

// -----------------------------
// GET /api/tasks/:id
// -----------------------------
pub async fn get_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.pool.acquire().await?;
    ownership::require_owner(&mut conn, ResourceKind::Task, id, user_id).await?;
    let task = store::get_task(&mut conn, id)
        .await?
        .ok_or(AppError::NotFound(ResourceKind::Task))?;
    Ok(Json(task))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<NaiveDate>>,
}

// -----------------------------
// PUT /api/tasks/:id
// Updates an existing task by ID; completed_at is derived, never taken from input
// ----------------------------
pub async fn update_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTaskInput>,
) -> Result<impl IntoResponse, AppError> {
    let title = input.title.as_deref().map(logic::validate_title).transpose()?;

    let mut tx = store::begin_write(&state.pool).await?;
    ownership::require_owner(&mut *tx, ResourceKind::Task, id, user_id).await?;

    let mut task = store::get_task(&mut *tx, id)
        .await?
        .ok_or(AppError::NotFound(ResourceKind::Task))?;

    let now = Utc::now();
    if let Some(title) = title {
        task.title = title;
    }
    if let Some(priority) = input.priority {
        task.priority = priority;
    }
    if let Some(due_date) = input.due_date {
        task.due_date = due_date;
    }
    if let Some(status) = input.status {
        (task.status, task.completed_at) =
            logic::apply_status(task.status, task.completed_at, status, now);
    }
    task.updated_at = now;

    store::save_task(&mut *tx, &task).await?;
    tx.commit().await?;

    Ok(Json(task))
}

// -----------------------------
// DELETE /api/tasks/:id
// Removes a task permanently, with its time entries
// -----------------------------
pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = store::begin_write(&state.pool).await?;
    ownership::require_owner(&mut *tx, ResourceKind::Task, id, user_id).await?;
    store::delete_task(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
