/*
Time-entry and task-status rules.
Module is independent from HTTP / Axum and storage for testing
*/

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::TaskStatus;

pub const DEFAULT_PROJECT_COLOR: &str = "#3b82f6";
pub const MAX_TITLE_LEN: usize = 255;

// Whole seconds between start and end.
//
// Rules:
// - end before start -> None (never a negative duration)
// - sub-second remainder is dropped
pub fn duration_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<i64> {
    if end < start {
        return None;
    }
    Some((end - start).num_seconds())
}

// Status a task moves to when a timer starts against it.
//     todo        -> in_progress
//     in_progress -> in_progress
//     completed   -> completed
pub fn status_after_timer_start(status: TaskStatus) -> TaskStatus {
    match status {
        TaskStatus::Todo => TaskStatus::InProgress,
        other => other,
    }
}

/// Resolve a status change into the stored `(status, completed_at)` pair.
///
/// `completed_at` is set to `now` on entering `completed`, kept when the task
/// is already completed, and cleared for every other status.
pub fn apply_status(
    current: TaskStatus,
    completed_at: Option<DateTime<Utc>>,
    next: TaskStatus,
    now: DateTime<Utc>,
) -> (TaskStatus, Option<DateTime<Utc>>) {
    match (current, next) {
        (TaskStatus::Completed, TaskStatus::Completed) => (next, completed_at.or(Some(now))),
        (_, TaskStatus::Completed) => (next, Some(now)),
        (_, other) => (other, None),
    }
}

pub fn validate_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("title required".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::BadRequest(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

// "#RRGGBB", defaulting when absent.
pub fn validate_color(color: Option<&str>) -> Result<String, AppError> {
    let Some(color) = color else {
        return Ok(DEFAULT_PROJECT_COLOR.to_string());
    };
    let hex = color.strip_prefix('#').unwrap_or("");
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::BadRequest("color must be #RRGGBB".into()));
    }
    Ok(color.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn duration_is_whole_seconds() {
        assert_eq!(duration_secs(t0(), t0()), Some(0));
        assert_eq!(duration_secs(t0(), t0() + Duration::seconds(3661)), Some(3661));
        assert_eq!(duration_secs(t0(), t0() + Duration::milliseconds(1999)), Some(1));
    }

    #[test]
    fn negative_duration_is_rejected() {
        assert_eq!(duration_secs(t0(), t0() - Duration::seconds(10)), None);
        assert_eq!(duration_secs(t0(), t0() - Duration::milliseconds(1)), None);
    }

    #[test]
    fn timer_start_only_bumps_todo() {
        assert_eq!(status_after_timer_start(TaskStatus::Todo), TaskStatus::InProgress);
        assert_eq!(status_after_timer_start(TaskStatus::InProgress), TaskStatus::InProgress);
        assert_eq!(status_after_timer_start(TaskStatus::Completed), TaskStatus::Completed);
    }

    #[test]
    fn completed_at_tracks_completed_status() {
        let now = t0();
        assert_eq!(
            apply_status(TaskStatus::Todo, None, TaskStatus::Completed, now),
            (TaskStatus::Completed, Some(now))
        );

        let earlier = now - Duration::days(2);
        assert_eq!(
            apply_status(TaskStatus::Completed, Some(earlier), TaskStatus::Completed, now),
            (TaskStatus::Completed, Some(earlier))
        );
        assert_eq!(
            apply_status(TaskStatus::Completed, Some(earlier), TaskStatus::InProgress, now),
            (TaskStatus::InProgress, None)
        );
        assert_eq!(
            apply_status(TaskStatus::InProgress, None, TaskStatus::Todo, now),
            (TaskStatus::Todo, None)
        );
    }

    #[test]
    fn titles_are_trimmed_and_bounded() {
        assert_eq!(validate_title("  Write report ").unwrap(), "Write report");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
    }

    #[test]
    fn colors_are_hex_triplets() {
        assert_eq!(validate_color(None).unwrap(), DEFAULT_PROJECT_COLOR);
        assert_eq!(validate_color(Some("#AABBCC")).unwrap(), "#aabbcc");
        assert!(validate_color(Some("red")).is_err());
        assert!(validate_color(Some("#12345")).is_err());
        assert!(validate_color(Some("#12345g")).is_err());
    }
}
