// --------------------------------------------------
// Timer lifecycle engine.
//
// Per user the timer is either Idle (no open entry) or Running
// (exactly one entry with end_time = NULL). Every transition runs
// in a single transaction; the partial unique index on
// time_entries(user_id) WHERE end_time IS NULL backs the check
// against concurrent starts.
// --------------------------------------------------

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, is_unique_violation};
use crate::events::{TaskStatusHandler, TimerEvent};
use crate::logic;
use crate::metrics::Metrics;
use crate::models::{ActiveTimer, ResourceKind, TimeEntry, present};
use crate::ownership;
use crate::store;

pub const DEFAULT_PAGE: i64 = 50;
pub const MAX_PAGE: i64 = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct StartTimer {
    pub task_id: Uuid,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>, // defaults to now
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopTimer {
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>, // defaults to now
}

/// Partial edit of a time entry. An absent key keeps the stored value,
/// an explicit `null` clears `end_time` / `description`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeEntryPatch {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "present")]
    pub end_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
}

#[derive(Clone)]
pub struct TimerEngine {
    pool: SqlitePool,
    metrics: Arc<dyn Metrics>,
    status_handler: TaskStatusHandler,
}

impl TimerEngine {
    pub fn new(pool: SqlitePool, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            pool,
            metrics,
            status_handler: TaskStatusHandler,
        }
    }

    fn record<T>(&self, op: &'static str, result: &Result<T, AppError>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(err) => err.code(),
        };
        self.metrics.increment(op, outcome);
    }

    // -----------------------------
    // start: Idle -> Running
    // -----------------------------
    pub async fn start(&self, user_id: Uuid, req: StartTimer) -> Result<TimeEntry, AppError> {
        let result = self.start_in_tx(user_id, req).await;
        self.record("timer.start", &result);
        result
    }

    async fn start_in_tx(&self, user_id: Uuid, req: StartTimer) -> Result<TimeEntry, AppError> {
        let now = Utc::now();
        let start_time = req.start_time.unwrap_or(now);

        let mut tx = store::begin_write(&self.pool).await?;

        ownership::require_owner(&mut *tx, ResourceKind::Task, req.task_id, user_id).await?;

        if let Some(active) = store::open_time_entry(&mut *tx, user_id).await? {
            return Err(AppError::ConflictActiveTimer { active_entry_id: active.id });
        }

        let entry = TimeEntry {
            id: Uuid::new_v4(),
            task_id: req.task_id,
            user_id,
            start_time,
            end_time: None,
            duration: None,
            description: req.description,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = store::insert_time_entry(&mut *tx, &entry).await {
            tx.rollback().await?;
            return Err(self.conflict_or(user_id, err).await);
        }

        let event = TimerEvent::Started {
            entry_id: entry.id,
            task_id: entry.task_id,
            user_id,
            at: now,
        };
        self.status_handler.handle(&mut *tx, &event).await?;

        tx.commit().await?;

        tracing::info!(%user_id, entry_id = %entry.id, task_id = %entry.task_id, "timer started");
        Ok(entry)
    }

    // -----------------------------
    // stop: Running -> Idle
    // -----------------------------
    pub async fn stop(&self, user_id: Uuid, req: StopTimer) -> Result<TimeEntry, AppError> {
        let result = self.stop_in_tx(user_id, req).await;
        self.record("timer.stop", &result);
        if let Ok(entry) = &result {
            if let Some(duration) = entry.duration {
                self.metrics.observe_seconds("timer.duration", duration);
            }
        }
        result
    }

    async fn stop_in_tx(&self, user_id: Uuid, req: StopTimer) -> Result<TimeEntry, AppError> {
        let end_time = req.end_time.unwrap_or_else(Utc::now);

        let mut tx = store::begin_write(&self.pool).await?;

        let Some(mut entry) = store::open_time_entry(&mut *tx, user_id).await? else {
            return Err(AppError::NoActiveTimer);
        };

        let duration =
            logic::duration_secs(entry.start_time, end_time).ok_or(AppError::InvalidTimeRange)?;

        entry.end_time = Some(end_time);
        entry.duration = Some(duration);
        entry.updated_at = Utc::now();
        store::save_time_entry(&mut *tx, &entry).await?;

        tx.commit().await?;

        tracing::info!(%user_id, entry_id = %entry.id, duration, "timer stopped");
        Ok(entry)
    }

    // -----------------------------
    // edit: rewrite start/end/description
    // -----------------------------
    pub async fn edit(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        patch: TimeEntryPatch,
    ) -> Result<TimeEntry, AppError> {
        let result = self.edit_in_tx(user_id, entry_id, patch).await;
        self.record("timer.edit", &result);
        result
    }

    async fn edit_in_tx(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        patch: TimeEntryPatch,
    ) -> Result<TimeEntry, AppError> {
        let mut tx = store::begin_write(&self.pool).await?;

        ownership::require_owner(&mut *tx, ResourceKind::TimeEntry, entry_id, user_id).await?;

        let mut entry = store::get_time_entry(&mut *tx, entry_id)
            .await?
            .ok_or(AppError::NotFound(ResourceKind::TimeEntry))?;

        let start_time = patch.start_time.unwrap_or(entry.start_time);
        let end_time = patch.end_time.unwrap_or(entry.end_time);
        let duration = match end_time {
            Some(end) => {
                Some(logic::duration_secs(start_time, end).ok_or(AppError::InvalidTimeRange)?)
            }
            None => None,
        };

        // Re-opening a closed entry must not create a second running timer.
        if entry.end_time.is_some() && end_time.is_none() {
            if let Some(active) = store::open_time_entry(&mut *tx, user_id).await? {
                if active.id != entry.id {
                    return Err(AppError::ConflictActiveTimer { active_entry_id: active.id });
                }
            }
        }

        entry.start_time = start_time;
        entry.end_time = end_time;
        entry.duration = duration;
        if let Some(description) = patch.description {
            entry.description = description;
        }
        entry.updated_at = Utc::now();

        if let Err(err) = store::save_time_entry(&mut *tx, &entry).await {
            tx.rollback().await?;
            return Err(self.conflict_or(user_id, err).await);
        }

        tx.commit().await?;

        tracing::info!(%user_id, %entry_id, running = entry.is_running(), "time entry edited");
        Ok(entry)
    }

    // -----------------------------
    // delete
    // -----------------------------
    pub async fn delete(&self, user_id: Uuid, entry_id: Uuid) -> Result<(), AppError> {
        let result = self.delete_in_tx(user_id, entry_id).await;
        self.record("timer.delete", &result);
        result
    }

    async fn delete_in_tx(&self, user_id: Uuid, entry_id: Uuid) -> Result<(), AppError> {
        let mut tx = store::begin_write(&self.pool).await?;

        ownership::require_owner(&mut *tx, ResourceKind::TimeEntry, entry_id, user_id).await?;

        if !store::delete_time_entry(&mut *tx, entry_id).await? {
            return Err(AppError::NotFound(ResourceKind::TimeEntry));
        }

        tx.commit().await?;

        tracing::info!(%user_id, %entry_id, "time entry deleted");
        Ok(())
    }

    // -----------------------------
    // queries
    // -----------------------------
    pub async fn active(&self, user_id: Uuid) -> Result<Option<ActiveTimer>, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(store::active_timer(&mut conn, user_id).await?)
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<TimeEntry>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let offset = offset.unwrap_or(0).max(0);
        let mut conn = self.pool.acquire().await?;
        Ok(store::list_time_entries(&mut conn, user_id, limit, offset).await?)
    }

    // A write lost the race on the one-open-entry index: report the winner.
    async fn conflict_or(&self, user_id: Uuid, err: sqlx::Error) -> AppError {
        if !is_unique_violation(&err) {
            return err.into();
        }
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(acquire_err) => return acquire_err.into(),
        };
        match store::open_time_entry(&mut conn, user_id).await {
            Ok(Some(active)) => AppError::ConflictActiveTimer { active_entry_id: active.id },
            Ok(None) => err.into(),
            Err(lookup_err) => lookup_err.into(),
        }
    }
}
