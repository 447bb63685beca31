use crate::database::DatabasePool;
use crate::error::ApiError;
use crate::models::{
    NewTicket, PageRequest, Ticket, TicketFilter, TicketScope, TicketStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const TICKET_COLUMNS: &str = "id, title, description, status, priority, created_by_id, \
     assigned_to_id, customer_id, created_at, updated_at, last_activity_at, deleted_at";

#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Non-deleted ticket by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ticket>, ApiError>;
    /// Non-deleted tickets in `scope` matching `filter`, newest first.
    async fn list(
        &self,
        scope: TicketScope,
        filter: &TicketFilter,
        page: PageRequest,
    ) -> Result<(Vec<Ticket>, i64), ApiError>;
    async fn create(&self, ticket: &NewTicket) -> Result<Ticket, ApiError>;
    /// Set status and refresh `updated_at` and `last_activity_at`.
    async fn update_status(
        &self,
        id: Uuid,
        status: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Ticket, ApiError>;
    /// Set or clear the assignee and refresh `updated_at`.
    async fn update_assignee(
        &self,
        id: Uuid,
        assignee: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<Ticket, ApiError>;
}

pub struct SqlxTicketRepository {
    pool: DatabasePool,
}

impl SqlxTicketRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Encode a scope as the (kind, user) pair bound into the listing query.
fn scope_params(scope: TicketScope) -> (&'static str, Option<Uuid>) {
    match scope {
        TicketScope::All => ("all", None),
        TicketScope::CompanyMember(id) => ("staff", Some(id)),
        TicketScope::Customer(id) => ("customer", Some(id)),
    }
}

#[async_trait]
impl TicketRepository for SqlxTicketRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ticket>, ApiError> {
        let sql = format!(
            "SELECT {} FROM tickets WHERE id = $1 AND deleted_at IS NULL",
            TICKET_COLUMNS
        );
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn list(
        &self,
        scope: TicketScope,
        filter: &TicketFilter,
        page: PageRequest,
    ) -> Result<(Vec<Ticket>, i64), ApiError> {
        let (scope_kind, scope_user) = scope_params(scope);
        let search_pattern = super::contains_pattern(filter.search.as_deref());

        let where_sql = "WHERE deleted_at IS NULL \
             AND ($1 = 'all' \
                  OR ($1 = 'staff' AND (created_by_id = $2 OR assigned_to_id = $2)) \
                  OR ($1 = 'customer' AND (created_by_id = $2 OR customer_id = $2))) \
             AND ($3::ticket_status IS NULL OR status = $3) \
             AND ($4::ticket_priority IS NULL OR priority = $4) \
             AND ($5::TEXT IS NULL OR title ILIKE $5 OR description ILIKE $5)";

        let total_count =
            sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM tickets {}", where_sql))
                .bind(scope_kind)
                .bind(scope_user)
                .bind(filter.status)
                .bind(filter.priority)
                .bind(&search_pattern)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY created_at DESC LIMIT $6 OFFSET $7",
            TICKET_COLUMNS, where_sql
        );
        let tickets = sqlx::query_as::<_, Ticket>(&sql)
            .bind(scope_kind)
            .bind(scope_user)
            .bind(filter.status)
            .bind(filter.priority)
            .bind(&search_pattern)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((tickets, total_count))
    }

    async fn create(&self, ticket: &NewTicket) -> Result<Ticket, ApiError> {
        let sql = format!(
            "INSERT INTO tickets (id, title, description, status, priority, created_by_id, \
             customer_id, created_at, updated_at, last_activity_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $8) RETURNING {}",
            TICKET_COLUMNS
        );
        let created = sqlx::query_as::<_, Ticket>(&sql)
            .bind(Uuid::new_v4())
            .bind(&ticket.title)
            .bind(&ticket.description)
            .bind(TicketStatus::InProgress)
            .bind(ticket.priority)
            .bind(ticket.created_by_id)
            .bind(ticket.customer_id)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Ticket, ApiError> {
        let sql = format!(
            "UPDATE tickets SET status = $2, updated_at = $3, last_activity_at = $3 \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            TICKET_COLUMNS
        );
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(id)
            .bind(status)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        ticket.ok_or_else(|| ApiError::NotFound(format!("Ticket {} not found", id)))
    }

    async fn update_assignee(
        &self,
        id: Uuid,
        assignee: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<Ticket, ApiError> {
        let sql = format!(
            "UPDATE tickets SET assigned_to_id = $2, updated_at = $3 \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            TICKET_COLUMNS
        );
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(id)
            .bind(assignee)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        ticket.ok_or_else(|| ApiError::NotFound(format!("Ticket {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_params() {
        let id = Uuid::new_v4();
        assert_eq!(scope_params(TicketScope::All), ("all", None));
        assert_eq!(scope_params(TicketScope::CompanyMember(id)), ("staff", Some(id)));
        assert_eq!(scope_params(TicketScope::Customer(id)), ("customer", Some(id)));
    }
}
