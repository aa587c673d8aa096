// --------------------------------------------------
// Persistent storage (SQLite through sqlx).
//
// Every row operation takes `&mut SqliteConnection` so the same
// function runs on a pooled connection or inside a transaction.
// --------------------------------------------------

use std::{fs, str::FromStr, time::Duration};

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    Sqlite, SqliteConnection, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use uuid::Uuid;

use crate::models::{ActiveTimer, Goal, Priority, Project, Task, TaskStatus, TimeEntry, User};

pub const MEMORY_URL: &str = "sqlite::memory:";

// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS projects (
        id BLOB PRIMARY KEY,
        user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        color TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id BLOB PRIMARY KEY,
        project_id BLOB NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        priority TEXT NOT NULL DEFAULT 'medium',
        status TEXT NOT NULL DEFAULT 'todo',
        due_date TEXT,
        completed_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS time_entries (
        id BLOB PRIMARY KEY,
        task_id BLOB NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        start_time TEXT NOT NULL,
        end_time TEXT,
        duration INTEGER,
        description TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    // at most one open entry per user
    "CREATE UNIQUE INDEX IF NOT EXISTS time_entries_one_open_per_user
        ON time_entries(user_id) WHERE end_time IS NULL",
    "CREATE INDEX IF NOT EXISTS time_entries_task ON time_entries(task_id)",
    "CREATE INDEX IF NOT EXISTS tasks_project ON tasks(project_id)",
    "CREATE TABLE IF NOT EXISTS goals (
        id BLOB PRIMARY KEY,
        user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        target_hours INTEGER,
        created_at TEXT NOT NULL
    )",
];

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    // An in-memory database lives and dies with its connection.
    let pool = if database_url == MEMORY_URL {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options.journal_mode(SqliteJournalMode::Wal))
            .await?
    };
    Ok(pool)
}

/// Opens a write transaction that takes the database write lock at BEGIN.
/// Concurrent writers queue on the busy timeout; a deferred transaction
/// would fail with SQLITE_BUSY when upgrading from read to write.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = begin_write(pool).await?;
    for stmt in SCHEMA {
        sqlx::query(*stmt).execute(&mut *tx).await?;
    }
    tx.commit().await
}

#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let pool = connect(MEMORY_URL, 1).await.expect("open in-memory db");
    migrate(&pool).await.expect("migrate in-memory db");
    pool
}

// -----------------------------
// users
// -----------------------------

pub async fn create_user(conn: &mut SqliteConnection, email: &str) -> Result<User, sqlx::Error> {
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        created_at: Utc::now(),
    };
    sqlx::query("INSERT INTO users (id, email, created_at) VALUES (?, ?, ?)")
        .bind(user.id)
        .bind(&user.email)
        .bind(user.created_at)
        .execute(&mut *conn)
        .await?;
    Ok(user)
}

// -----------------------------
// projects
// -----------------------------

pub async fn create_project(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    name: &str,
    color: &str,
) -> Result<Project, sqlx::Error> {
    let now = Utc::now();
    let project = Project {
        id: Uuid::new_v4(),
        user_id,
        name: name.to_string(),
        color: color.to_string(),
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO projects (id, user_id, name, color, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(project.id)
    .bind(project.user_id)
    .bind(&project.name)
    .bind(&project.color)
    .bind(project.created_at)
    .bind(project.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(project)
}

pub async fn list_projects(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "SELECT * FROM projects WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
}

/// Tasks and their time entries go with the project (ON DELETE CASCADE).
pub async fn delete_project(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let done = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected() > 0)
}

// -----------------------------
// tasks
// -----------------------------

pub async fn create_task(
    conn: &mut SqliteConnection,
    project_id: Uuid,
    title: &str,
    priority: Priority,
    due_date: Option<NaiveDate>,
) -> Result<Task, sqlx::Error> {
    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4(),
        project_id,
        title: title.to_string(),
        priority,
        status: TaskStatus::Todo,
        due_date,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO tasks
            (id, project_id, title, priority, status, due_date, completed_at,
             created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?)",
    )
    .bind(task.id)
    .bind(task.project_id)
    .bind(&task.title)
    .bind(task.priority.as_str())
    .bind(task.status.as_str())
    .bind(task.due_date)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(task)
}

pub async fn get_task(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// Writes every mutable column of `task` back.
pub async fn save_task(conn: &mut SqliteConnection, task: &Task) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE tasks
         SET title = ?, priority = ?, status = ?, due_date = ?, completed_at = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&task.title)
    .bind(task.priority.as_str())
    .bind(task.status.as_str())
    .bind(task.due_date)
    .bind(task.completed_at)
    .bind(task.updated_at)
    .bind(task.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Compare-and-set on status. Returns false when the current status was not `from`.
pub async fn transition_task_status(
    conn: &mut SqliteConnection,
    id: Uuid,
    from: TaskStatus,
    to: TaskStatus,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let done =
        sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(at)
            .bind(id)
            .bind(from.as_str())
            .execute(&mut *conn)
            .await?;
    Ok(done.rows_affected() > 0)
}

pub async fn delete_task(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let done = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected() > 0)
}

// -----------------------------
// goals
// -----------------------------

pub async fn create_goal(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    title: &str,
    target_hours: Option<i64>,
) -> Result<Goal, sqlx::Error> {
    let goal = Goal {
        id: Uuid::new_v4(),
        user_id,
        title: title.to_string(),
        target_hours,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO goals (id, user_id, title, target_hours, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(goal.id)
    .bind(goal.user_id)
    .bind(&goal.title)
    .bind(goal.target_hours)
    .bind(goal.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(goal)
}

pub async fn delete_goal(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let done = sqlx::query("DELETE FROM goals WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected() > 0)
}

// -----------------------------
// time entries
// -----------------------------

pub async fn insert_time_entry(
    conn: &mut SqliteConnection,
    entry: &TimeEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO time_entries
            (id, task_id, user_id, start_time, end_time, duration, description,
             created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id)
    .bind(entry.task_id)
    .bind(entry.user_id)
    .bind(entry.start_time)
    .bind(entry.end_time)
    .bind(entry.duration)
    .bind(&entry.description)
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_time_entry(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<TimeEntry>, sqlx::Error> {
    sqlx::query_as::<_, TimeEntry>("SELECT * FROM time_entries WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn open_time_entry(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Option<TimeEntry>, sqlx::Error> {
    sqlx::query_as::<_, TimeEntry>(
        "SELECT * FROM time_entries WHERE user_id = ? AND end_time IS NULL",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn active_timer(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Option<ActiveTimer>, sqlx::Error> {
    sqlx::query_as::<_, ActiveTimer>(
        "SELECT e.*, t.title AS task_title, p.id AS project_id,
                p.name AS project_name, p.color AS project_color
         FROM time_entries e
         JOIN tasks t ON t.id = e.task_id
         JOIN projects p ON p.id = t.project_id
         WHERE e.user_id = ? AND e.end_time IS NULL",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn list_time_entries(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<TimeEntry>, sqlx::Error> {
    sqlx::query_as::<_, TimeEntry>(
        "SELECT * FROM time_entries WHERE user_id = ? ORDER BY start_time DESC LIMIT ? OFFSET ?",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await
}

/// Writes start/end/duration/description of `entry` back.
pub async fn save_time_entry(
    conn: &mut SqliteConnection,
    entry: &TimeEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE time_entries
         SET start_time = ?, end_time = ?, duration = ?, description = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(entry.start_time)
    .bind(entry.end_time)
    .bind(entry.duration)
    .bind(&entry.description)
    .bind(entry.updated_at)
    .bind(entry.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete_time_entry(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let done = sqlx::query("DELETE FROM time_entries WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected() > 0)
}

#[cfg(test)]
pub async fn count_time_entries(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM time_entries WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let pool = memory_pool().await;
        migrate(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn deleting_project_cascades_to_tasks_and_entries() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = create_user(&mut conn, "a@example.com").await.unwrap();
        let project = create_project(&mut conn, user.id, "Site", "#112233").await.unwrap();
        let task = create_task(&mut conn, project.id, "Header", Priority::High, None)
            .await
            .unwrap();
        let now = Utc::now();
        let entry = TimeEntry {
            id: Uuid::new_v4(),
            task_id: task.id,
            user_id: user.id,
            start_time: now,
            end_time: None,
            duration: None,
            description: None,
            created_at: now,
            updated_at: now,
        };
        insert_time_entry(&mut conn, &entry).await.unwrap();

        assert!(delete_project(&mut conn, project.id).await.unwrap());
        assert!(get_task(&mut conn, task.id).await.unwrap().is_none());
        assert!(get_time_entry(&mut conn, entry.id).await.unwrap().is_none());
        assert_eq!(count_time_entries(&mut conn, user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn second_open_entry_for_same_user_violates_index() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = create_user(&mut conn, "b@example.com").await.unwrap();
        let project = create_project(&mut conn, user.id, "Ops", "#000000").await.unwrap();
        let task = create_task(&mut conn, project.id, "Pager", Priority::Low, None)
            .await
            .unwrap();
        let now = Utc::now();
        let open = |id| TimeEntry {
            id,
            task_id: task.id,
            user_id: user.id,
            start_time: now,
            end_time: None,
            duration: None,
            description: None,
            created_at: now,
            updated_at: now,
        };

        insert_time_entry(&mut conn, &open(Uuid::new_v4())).await.unwrap();
        let err = insert_time_entry(&mut conn, &open(Uuid::new_v4())).await.unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn status_transition_is_compare_and_set() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let user = create_user(&mut conn, "c@example.com").await.unwrap();
        let project = create_project(&mut conn, user.id, "Home", "#abcdef").await.unwrap();
        let task = create_task(&mut conn, project.id, "Paint", Priority::Medium, None)
            .await
            .unwrap();

        let now = Utc::now();
        let (todo, doing) = (TaskStatus::Todo, TaskStatus::InProgress);
        assert!(transition_task_status(&mut conn, task.id, todo, doing, now).await.unwrap());
        assert!(!transition_task_status(&mut conn, task.id, todo, doing, now).await.unwrap());
        let task = get_task(&mut conn, task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
    }
}
