use crate::auth::context::UserContext;
use crate::auth::policy;
use crate::auth::rbac::Permission;
use crate::error::ApiError;
use crate::models::{TimeLogResponse, Ticket};
use crate::repositories::time_log_repo::TIMER_ALREADY_RUNNING;
use crate::repositories::{TicketRepository, TimeLogRepository, UserRepository};
use crate::services::load_user_summaries;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Start/stop work intervals on tickets. Only the assignee tracks time.
pub struct TimeLogService {
    time_log_repo: Arc<dyn TimeLogRepository + Send + Sync>,
    ticket_repo: Arc<dyn TicketRepository + Send + Sync>,
    user_repo: Arc<dyn UserRepository + Send + Sync>,
}

impl TimeLogService {
    pub fn new(
        time_log_repo: Arc<dyn TimeLogRepository + Send + Sync>,
        ticket_repo: Arc<dyn TicketRepository + Send + Sync>,
        user_repo: Arc<dyn UserRepository + Send + Sync>,
    ) -> Self {
        Self {
            time_log_repo,
            ticket_repo,
            user_repo,
        }
    }

    pub async fn start(
        &self,
        ctx: &UserContext,
        ticket_id: Uuid,
    ) -> Result<TimeLogResponse, ApiError> {
        if !ctx.is_company_member {
            return Err(ApiError::authorization("Customers cannot track time"));
        }

        let ticket = self.find_ticket(ticket_id).await?;
        if !policy::is_assignee(ctx, &ticket) {
            return Err(ApiError::authorization(
                "Only the ticket's assignee can track time on it",
            ));
        }

        if self
            .time_log_repo
            .find_running(ctx.user_id, ticket_id)
            .await?
            .is_some()
        {
            return Err(ApiError::conflict(TIMER_ALREADY_RUNNING));
        }

        let log = self
            .time_log_repo
            .start(ticket_id, ctx.user_id, Utc::now())
            .await?;

        tracing::info!(
            time_log_id = %log.id,
            ticket_id = %ticket_id,
            user_id = %ctx.user_id,
            "timer started"
        );

        Ok(TimeLogResponse::new(&log, ctx.full_name.clone()))
    }

    /// Stop the caller's running interval. Anything else (unknown id, other
    /// user's log, already stopped) is `NotFound` and changes nothing.
    pub async fn stop(
        &self,
        ctx: &UserContext,
        time_log_id: Uuid,
    ) -> Result<TimeLogResponse, ApiError> {
        let log = self
            .time_log_repo
            .stop(time_log_id, ctx.user_id, Utc::now())
            .await?
            .ok_or_else(|| {
                ApiError::not_found(format!("No running time log {} for this user", time_log_id))
            })?;

        tracing::info!(
            time_log_id = %log.id,
            ticket_id = %log.ticket_id,
            user_id = %ctx.user_id,
            duration_seconds = ?log.total_duration_seconds,
            "timer stopped"
        );

        Ok(TimeLogResponse::new(&log, ctx.full_name.clone()))
    }

    pub async fn list_for_ticket(
        &self,
        ctx: &UserContext,
        ticket_id: Uuid,
    ) -> Result<Vec<TimeLogResponse>, ApiError> {
        let ticket = self.find_ticket(ticket_id).await?;
        if !ctx.has_permission(&Permission::ViewAllTimeLogs) && !policy::is_assignee(ctx, &ticket)
        {
            return Err(ApiError::authorization(
                "Only administrators and the assignee can view time logs",
            ));
        }

        let logs = self.time_log_repo.list_by_ticket(ticket_id).await?;
        let users =
            load_user_summaries(self.user_repo.as_ref(), logs.iter().map(|l| l.user_id)).await?;

        Ok(logs
            .iter()
            .map(|log| {
                let name = users
                    .get(&log.user_id)
                    .map(|u| u.full_name.clone())
                    .unwrap_or_default();
                TimeLogResponse::new(log, name)
            })
            .collect())
    }

    async fn find_ticket(&self, ticket_id: Uuid) -> Result<Ticket, ApiError> {
        self.ticket_repo
            .find_by_id(ticket_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Ticket {} not found", ticket_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rbac::Role;
    use crate::test_support::InMemoryDatabase;

    struct Fixture {
        db: Arc<InMemoryDatabase>,
        service: TimeLogService,
        assignee: UserContext,
        ticket_id: Uuid,
    }

    fn fixture() -> Fixture {
        let db = InMemoryDatabase::new();
        let repos = db.repositories();
        let customer = db.add_customer("carol");
        let staff = db.add_staff("sam", &[Role::Support]);
        let ticket = db.add_ticket(&customer, Some(staff.id));
        Fixture {
            service: TimeLogService::new(repos.time_logs, repos.tickets, repos.users),
            assignee: db.context(&staff),
            ticket_id: ticket.id,
            db,
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_records_duration() {
        let f = fixture();

        let started = f.service.start(&f.assignee, f.ticket_id).await.unwrap();
        assert!(started.end_time.is_none());
        assert_eq!(started.user_name, f.assignee.full_name);

        let stopped = f.service.stop(&f.assignee, started.id).await.unwrap();
        let end = stopped.end_time.unwrap();
        assert_eq!(
            stopped.total_duration_seconds,
            Some((end - stopped.start_time).num_seconds())
        );
    }

    #[tokio::test]
    async fn test_second_running_timer_is_rejected() {
        let f = fixture();
        f.service.start(&f.assignee, f.ticket_id).await.unwrap();

        let err = f.service.start(&f.assignee, f.ticket_id).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(f.db.time_logs().len(), 1);
    }

    #[tokio::test]
    async fn test_start_requires_assignee() {
        let f = fixture();
        let other = f.db.context(&f.db.add_staff("sid", &[Role::Support]));
        let customer = f.db.context(&f.db.add_customer("dave"));

        let err = f.service.start(&other, f.ticket_id).await.unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let err = f.service.start(&customer, f.ticket_id).await.unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let err = f.service.start(&f.assignee, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(f.db.time_logs().is_empty());
    }

    #[tokio::test]
    async fn test_stop_only_own_running_log() {
        let f = fixture();
        let other = f.db.context(&f.db.add_staff("sid", &[Role::Support]));
        let started = f.service.start(&f.assignee, f.ticket_id).await.unwrap();

        let err = f.service.stop(&other, started.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(f.db.time_logs()[0].end_time.is_none());

        f.service.stop(&f.assignee, started.id).await.unwrap();
        let err = f.service.stop(&f.assignee, started.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_visibility() {
        let f = fixture();
        let admin = f.db.context(&f.db.add_admin("ada"));
        let other = f.db.context(&f.db.add_staff("sid", &[Role::Support]));
        let started = f.service.start(&f.assignee, f.ticket_id).await.unwrap();
        f.service.stop(&f.assignee, started.id).await.unwrap();

        let logs = f.service.list_for_ticket(&admin, f.ticket_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].user_name, f.assignee.full_name);

        assert_eq!(
            f.service.list_for_ticket(&f.assignee, f.ticket_id).await.unwrap().len(),
            1
        );

        let err = f.service.list_for_ticket(&other, f.ticket_id).await.unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));
    }
}
