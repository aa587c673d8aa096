// --------------------------------------------------
// Domain events raised by the timer engine and the handler that
// keeps Task status in step with them.
//
// Handlers run on the connection of the transaction that raised
// the event, so the status change commits or rolls back with it.
// --------------------------------------------------

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::AppError;
use crate::logic;
use crate::models::{ResourceKind, TaskStatus};
use crate::store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Started {
        entry_id: Uuid,
        task_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TaskStatusHandler;

impl TaskStatusHandler {
    /// Returns the new task status when the event changed it.
    pub async fn handle(
        &self,
        conn: &mut SqliteConnection,
        event: &TimerEvent,
    ) -> Result<Option<TaskStatus>, AppError> {
        match event {
            TimerEvent::Started { entry_id, task_id, user_id, at } => {
                let task = store::get_task(conn, *task_id)
                    .await?
                    .ok_or(AppError::NotFound(ResourceKind::Task))?;

                let next = logic::status_after_timer_start(task.status);
                if next == task.status {
                    return Ok(None);
                }

                let changed =
                    store::transition_task_status(conn, *task_id, task.status, next, *at).await?;
                if changed {
                    tracing::info!(
                        %task_id,
                        %entry_id,
                        %user_id,
                        from = task.status.as_str(),
                        to = next.as_str(),
                        "task status bumped by timer"
                    );
                    Ok(Some(next))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    #[tokio::test]
    async fn started_event_moves_todo_to_in_progress() {
        let pool = store::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user = store::create_user(&mut conn, "e@example.com").await.unwrap();
        let project = store::create_project(&mut conn, user.id, "P", "#505050").await.unwrap();
        let task = store::create_task(&mut conn, project.id, "T", Priority::High, None)
            .await
            .unwrap();

        let event = TimerEvent::Started {
            entry_id: Uuid::new_v4(),
            task_id: task.id,
            user_id: user.id,
            at: Utc::now(),
        };
        let handler = TaskStatusHandler;

        assert_eq!(handler.handle(&mut conn, &event).await.unwrap(), Some(TaskStatus::InProgress));
        // second delivery is a no-op
        assert_eq!(handler.handle(&mut conn, &event).await.unwrap(), None);
    }

    #[tokio::test]
    async fn completed_task_is_left_alone() {
        let pool = store::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user = store::create_user(&mut conn, "f@example.com").await.unwrap();
        let project = store::create_project(&mut conn, user.id, "P", "#606060").await.unwrap();
        let mut task = store::create_task(&mut conn, project.id, "T", Priority::High, None)
            .await
            .unwrap();
        let now = Utc::now();
        (task.status, task.completed_at) =
            logic::apply_status(task.status, task.completed_at, TaskStatus::Completed, now);
        store::save_task(&mut conn, &task).await.unwrap();

        let event = TimerEvent::Started {
            entry_id: Uuid::new_v4(),
            task_id: task.id,
            user_id: user.id,
            at: now,
        };
        assert_eq!(TaskStatusHandler.handle(&mut conn, &event).await.unwrap(), None);

        let stored = store::get_task(&mut conn, task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert!(stored.completed_at.is_some());
    }
}
