use crate::database::DatabasePool;
use crate::error::ApiError;
use crate::models::TimeLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const TIME_LOG_COLUMNS: &str = "id, ticket_id, user_id, start_time, end_time, \
     total_duration_seconds, created_at, deleted_at";

pub const TIMER_ALREADY_RUNNING: &str = "a timer is already running for this ticket";

#[async_trait]
pub trait TimeLogRepository: Send + Sync {
    /// The caller's running, non-deleted interval on a ticket.
    async fn find_running(&self, user_id: Uuid, ticket_id: Uuid)
        -> Result<Option<TimeLog>, ApiError>;
    /// Open a new interval. A second running interval for the same
    /// (user, ticket) is rejected with `Conflict`.
    async fn start(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<TimeLog, ApiError>;
    /// Close the interval if it is the caller's and still running. Returns
    /// `None` without mutating anything otherwise.
    async fn stop(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<TimeLog>, ApiError>;
    /// Non-deleted intervals of a ticket ordered by start time.
    async fn list_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<TimeLog>, ApiError>;
}

pub struct SqlxTimeLogRepository {
    pool: DatabasePool,
}

impl SqlxTimeLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TimeLogRepository for SqlxTimeLogRepository {
    async fn find_running(
        &self,
        user_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<Option<TimeLog>, ApiError> {
        let sql = format!(
            "SELECT {} FROM time_logs WHERE user_id = $1 AND ticket_id = $2 \
             AND end_time IS NULL AND deleted_at IS NULL",
            TIME_LOG_COLUMNS
        );
        let log = sqlx::query_as::<_, TimeLog>(&sql)
            .bind(user_id)
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(log)
    }

    async fn start(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<TimeLog, ApiError> {
        let sql = format!(
            "INSERT INTO time_logs (id, ticket_id, user_id, start_time, created_at) \
             VALUES ($1, $2, $3, $4, $4) RETURNING {}",
            TIME_LOG_COLUMNS
        );
        sqlx::query_as::<_, TimeLog>(&sql)
            .bind(Uuid::new_v4())
            .bind(ticket_id)
            .bind(user_id)
            .bind(at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ApiError::from_unique_violation(e, TIMER_ALREADY_RUNNING))
    }

    async fn stop(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<TimeLog>, ApiError> {
        // Guarded on end_time IS NULL so two concurrent stops cannot both win.
        let sql = format!(
            "UPDATE time_logs SET end_time = $3, \
             total_duration_seconds = FLOOR(EXTRACT(EPOCH FROM ($3 - start_time)))::BIGINT \
             WHERE id = $1 AND user_id = $2 AND end_time IS NULL AND deleted_at IS NULL \
             RETURNING {}",
            TIME_LOG_COLUMNS
        );
        let log = sqlx::query_as::<_, TimeLog>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(log)
    }

    async fn list_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<TimeLog>, ApiError> {
        let sql = format!(
            "SELECT {} FROM time_logs WHERE ticket_id = $1 AND deleted_at IS NULL \
             ORDER BY start_time ASC",
            TIME_LOG_COLUMNS
        );
        let logs = sqlx::query_as::<_, TimeLog>(&sql)
            .bind(ticket_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(logs)
    }
}
