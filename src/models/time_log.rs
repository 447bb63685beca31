use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TimeLog {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_duration_seconds: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TimeLog {
    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }

    /// Stored duration, or `end - start` when only the end was recorded.
    pub fn effective_duration_seconds(&self) -> Option<i64> {
        self.total_duration_seconds.or_else(|| {
            self.end_time
                .map(|end| compute_duration_seconds(self.start_time, end))
        })
    }
}

/// Whole seconds between two instants, truncated.
pub fn compute_duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds()
}

/// Sum of effective durations over live intervals. Running intervals and
/// rows with neither a duration nor an end time contribute nothing.
pub fn total_time_spent(logs: &[TimeLog]) -> i64 {
    logs.iter()
        .filter(|log| log.deleted_at.is_none())
        .filter_map(TimeLog::effective_duration_seconds)
        .sum()
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeLogResponse {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_duration_seconds: Option<i64>,
}

impl TimeLogResponse {
    pub fn new(log: &TimeLog, user_name: impl Into<String>) -> Self {
        Self {
            id: log.id,
            ticket_id: log.ticket_id,
            user_id: log.user_id,
            user_name: user_name.into(),
            start_time: log.start_time,
            end_time: log.end_time,
            total_duration_seconds: log.total_duration_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn log(start: DateTime<Utc>, end: Option<DateTime<Utc>>, total: Option<i64>) -> TimeLog {
        TimeLog {
            id: Uuid::new_v4(),
            ticket_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            start_time: start,
            end_time: end,
            total_duration_seconds: total,
            created_at: start,
            deleted_at: None,
        }
    }

    #[test]
    fn test_duration_truncates_to_whole_seconds() {
        let start = Utc::now();
        let end = start + Duration::milliseconds(90_900);
        assert_eq!(compute_duration_seconds(start, end), 90);
    }

    #[test]
    fn test_total_prefers_stored_duration() {
        let start = Utc::now();
        let logs = vec![log(start, Some(start + Duration::seconds(100)), Some(60))];
        assert_eq!(total_time_spent(&logs), 60);
    }

    #[test]
    fn test_total_falls_back_and_skips_incomplete_rows() {
        let start = Utc::now();
        let mut deleted = log(start, Some(start + Duration::seconds(500)), Some(500));
        deleted.deleted_at = Some(start);

        let logs = vec![
            log(start, Some(start + Duration::seconds(30)), None),
            log(start, None, None),
            log(start, Some(start + Duration::seconds(45)), Some(45)),
            deleted,
        ];
        assert_eq!(total_time_spent(&logs), 75);
    }

    #[test]
    fn test_running_log() {
        let running = log(Utc::now(), None, None);
        assert!(running.is_running());
        assert_eq!(running.effective_duration_seconds(), None);
    }
}
