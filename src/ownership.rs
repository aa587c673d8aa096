// --------------------------------------------------
// Ownership guard.
//
// Resolves the owning user of a resource through its join path
//     project    -> projects.user_id
//     task       -> tasks -> projects.user_id
//     time_entry -> time_entries -> tasks -> projects.user_id
//     goal       -> goals.user_id
// and decides whether the acting user may touch it.
// --------------------------------------------------

use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed { owner_id: Uuid },
    NotFound,
    Forbidden,
}

impl Access {
    /// Map a rejection onto the error taxonomy; `Allowed` yields the owner id.
    pub fn into_result(self, kind: ResourceKind) -> Result<Uuid, AppError> {
        match self {
            Access::Allowed { owner_id } => Ok(owner_id),
            Access::NotFound => Err(AppError::NotFound(kind)),
            Access::Forbidden => Err(AppError::Forbidden),
        }
    }
}

#[derive(Debug, FromRow)]
struct OwnerRow {
    owner_id: Uuid,
    // time_entries.user_id, only for time entries
    cached_owner_id: Option<Uuid>,
}

fn owner_query(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Project => {
            "SELECT user_id AS owner_id, NULL AS cached_owner_id FROM projects WHERE id = ?"
        }
        ResourceKind::Task => {
            "SELECT p.user_id AS owner_id, NULL AS cached_owner_id
             FROM tasks t JOIN projects p ON p.id = t.project_id
             WHERE t.id = ?"
        }
        ResourceKind::TimeEntry => {
            "SELECT p.user_id AS owner_id, e.user_id AS cached_owner_id
             FROM time_entries e
             JOIN tasks t ON t.id = e.task_id
             JOIN projects p ON p.id = t.project_id
             WHERE e.id = ?"
        }
        ResourceKind::Goal => {
            "SELECT user_id AS owner_id, NULL AS cached_owner_id FROM goals WHERE id = ?"
        }
    }
}

/// Read-only lookup; storage failures come back as `Err`, never as a rejection.
pub async fn check_ownership(
    conn: &mut SqliteConnection,
    kind: ResourceKind,
    resource_id: Uuid,
    acting_user_id: Uuid,
) -> Result<Access, sqlx::Error> {
    let row = sqlx::query_as::<_, OwnerRow>(owner_query(kind))
        .bind(resource_id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(Access::NotFound);
    };

    if let Some(cached) = row.cached_owner_id {
        if cached != row.owner_id {
            // the task -> project chain is authoritative
            tracing::warn!(
                %resource_id,
                cached_owner = %cached,
                derived_owner = %row.owner_id,
                "time entry owner disagrees with its project owner"
            );
        }
    }

    if row.owner_id == acting_user_id {
        Ok(Access::Allowed { owner_id: row.owner_id })
    } else {
        Ok(Access::Forbidden)
    }
}

/// `check_ownership` folded into the error taxonomy.
pub async fn require_owner(
    conn: &mut SqliteConnection,
    kind: ResourceKind,
    resource_id: Uuid,
    acting_user_id: Uuid,
) -> Result<Uuid, AppError> {
    check_ownership(conn, kind, resource_id, acting_user_id)
        .await?
        .into_result(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, TimeEntry};
    use crate::store;
    use chrono::Utc;

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let pool = store::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let user = Uuid::new_v4();

        for kind in [
            ResourceKind::Project,
            ResourceKind::Task,
            ResourceKind::TimeEntry,
            ResourceKind::Goal,
        ] {
            let access = check_ownership(&mut conn, kind, Uuid::new_v4(), user).await.unwrap();
            assert_eq!(access, Access::NotFound, "{kind}");
        }
    }

    #[tokio::test]
    async fn task_access_follows_project_owner() {
        let pool = store::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let owner = store::create_user(&mut conn, "owner@example.com").await.unwrap();
        let other = store::create_user(&mut conn, "other@example.com").await.unwrap();
        let project = store::create_project(&mut conn, owner.id, "Book", "#101010").await.unwrap();
        let task = store::create_task(&mut conn, project.id, "Ch. 1", Priority::Medium, None)
            .await
            .unwrap();

        assert_eq!(
            check_ownership(&mut conn, ResourceKind::Task, task.id, owner.id).await.unwrap(),
            Access::Allowed { owner_id: owner.id }
        );
        assert_eq!(
            check_ownership(&mut conn, ResourceKind::Task, task.id, other.id).await.unwrap(),
            Access::Forbidden
        );

        // moving the task to another user's project is visible immediately
        let theirs = store::create_project(&mut conn, other.id, "Theirs", "#202020").await.unwrap();
        sqlx::query("UPDATE tasks SET project_id = ? WHERE id = ?")
            .bind(theirs.id)
            .bind(task.id)
            .execute(&mut *conn)
            .await
            .unwrap();
        assert_eq!(
            check_ownership(&mut conn, ResourceKind::Task, task.id, owner.id).await.unwrap(),
            Access::Forbidden
        );
        assert_eq!(
            check_ownership(&mut conn, ResourceKind::Task, task.id, other.id).await.unwrap(),
            Access::Allowed { owner_id: other.id }
        );
    }

    #[tokio::test]
    async fn non_owner_is_forbidden_from_time_entry() {
        let pool = store::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user1 = store::create_user(&mut conn, "u1@example.com").await.unwrap();
        let user2 = store::create_user(&mut conn, "u2@example.com").await.unwrap();
        let project = store::create_project(&mut conn, user1.id, "P", "#303030").await.unwrap();
        let task = store::create_task(&mut conn, project.id, "T", Priority::Low, None)
            .await
            .unwrap();
        let now = Utc::now();
        let entry = TimeEntry {
            id: Uuid::new_v4(),
            task_id: task.id,
            user_id: user1.id,
            start_time: now,
            end_time: None,
            duration: None,
            description: None,
            created_at: now,
            updated_at: now,
        };
        store::insert_time_entry(&mut conn, &entry).await.unwrap();

        let access = check_ownership(&mut conn, ResourceKind::TimeEntry, entry.id, user2.id)
            .await
            .unwrap();
        assert_eq!(access, Access::Forbidden);
        assert!(matches!(
            require_owner(&mut conn, ResourceKind::TimeEntry, entry.id, user2.id).await,
            Err(AppError::Forbidden)
        ));
        assert_eq!(
            require_owner(&mut conn, ResourceKind::TimeEntry, entry.id, user1.id).await.unwrap(),
            user1.id
        );
    }

    #[tokio::test]
    async fn goals_and_projects_are_owned_directly() {
        let pool = store::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = store::create_user(&mut conn, "g@example.com").await.unwrap();
        let goal = store::create_goal(&mut conn, user.id, "Ship v1", Some(40)).await.unwrap();
        let project = store::create_project(&mut conn, user.id, "P", "#404040").await.unwrap();

        assert_eq!(
            check_ownership(&mut conn, ResourceKind::Goal, goal.id, user.id).await.unwrap(),
            Access::Allowed { owner_id: user.id }
        );
        assert_eq!(
            check_ownership(&mut conn, ResourceKind::Project, project.id, Uuid::new_v4())
                .await
                .unwrap(),
            Access::Forbidden
        );
        assert!(matches!(
            require_owner(&mut conn, ResourceKind::Goal, Uuid::new_v4(), user.id).await,
            Err(AppError::NotFound(ResourceKind::Goal))
        ));
    }
}
