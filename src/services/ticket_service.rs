use crate::auth::context::UserContext;
use crate::auth::policy;
use crate::auth::rbac::Permission;
use crate::config::Settings;
use crate::error::ApiError;
use crate::models::{
    total_time_spent, NewTicket, PageRequest, Paged, Ticket, TicketCreate, TicketDetailResponse,
    TicketFilter, TicketListQuery, TicketPriority, TicketResponse, TicketScope, TicketStatus,
    MAX_TITLE_LENGTH,
};
use crate::repositories::{TicketRepository, TimeLogRepository, UserRepository};
use crate::require_permission;
use crate::services::load_user_summaries;
use crate::services::message_service::MessageService;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct TicketService {
    settings: Arc<Settings>,
    ticket_repo: Arc<dyn TicketRepository + Send + Sync>,
    user_repo: Arc<dyn UserRepository + Send + Sync>,
    time_log_repo: Arc<dyn TimeLogRepository + Send + Sync>,
    message_service: Arc<MessageService>,
}

impl TicketService {
    pub fn new(
        settings: Arc<Settings>,
        ticket_repo: Arc<dyn TicketRepository + Send + Sync>,
        user_repo: Arc<dyn UserRepository + Send + Sync>,
        time_log_repo: Arc<dyn TimeLogRepository + Send + Sync>,
        message_service: Arc<MessageService>,
    ) -> Self {
        Self {
            settings,
            ticket_repo,
            user_repo,
            time_log_repo,
            message_service,
        }
    }

    /// Tickets the caller participates in.
    pub async fn list_my_tickets(
        &self,
        ctx: &UserContext,
        query: &TicketListQuery,
    ) -> Result<Paged<TicketResponse>, ApiError> {
        let scope = if ctx.is_company_member {
            TicketScope::CompanyMember(ctx.user_id)
        } else {
            TicketScope::Customer(ctx.user_id)
        };
        self.list(scope, query).await
    }

    pub async fn list_all_tickets(
        &self,
        ctx: &UserContext,
        query: &TicketListQuery,
    ) -> Result<Paged<TicketResponse>, ApiError> {
        require_permission!(ctx, &Permission::ViewAllTickets);
        self.list(TicketScope::All, query).await
    }

    async fn list(
        &self,
        scope: TicketScope,
        query: &TicketListQuery,
    ) -> Result<Paged<TicketResponse>, ApiError> {
        let page = PageRequest::resolve(
            query.page,
            query.page_size,
            self.settings.default_page_size,
            self.settings.max_page_size,
        )?;
        let filter = parse_filter(query)?;

        let (tickets, total_count) = self.ticket_repo.list(scope, &filter, page).await?;
        let items = self.to_responses(&tickets).await?;
        Ok(Paged::new(items, total_count, page))
    }

    pub async fn get_ticket_detail(
        &self,
        ctx: &UserContext,
        ticket_id: Uuid,
    ) -> Result<TicketDetailResponse, ApiError> {
        let ticket = match self.ticket_repo.find_by_id(ticket_id).await? {
            Some(t) if policy::can_access_ticket(ctx, &t) => t,
            _ => return Err(ticket_not_found(ticket_id)),
        };

        let messages = self.message_service.thread(&ticket).await?;
        let time_logs = self.time_log_repo.list_by_ticket(ticket.id).await?;

        Ok(TicketDetailResponse {
            ticket: self.single_response(&ticket).await?,
            messages,
            total_time_spent_seconds: total_time_spent(&time_logs),
        })
    }

    pub async fn create_ticket(
        &self,
        ctx: &UserContext,
        input: &TicketCreate,
    ) -> Result<TicketResponse, ApiError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ApiError::validation("Title is required"));
        }
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(ApiError::validation(format!(
                "Title must be at most {} characters",
                MAX_TITLE_LENGTH
            )));
        }
        if input.description.trim().is_empty() {
            return Err(ApiError::validation("Description is required"));
        }

        let priority = match input.priority.as_deref().map(str::trim) {
            None | Some("") => TicketPriority::default(),
            Some(value) => TicketPriority::from_str(value)
                .ok_or_else(|| ApiError::validation(format!("Unknown priority '{}'", value)))?,
        };

        let customer_id = match input.customer_id {
            Some(target) if ctx.is_company_member && target != ctx.user_id => {
                self.require_customer(target).await?;
                target
            }
            _ => ctx.user_id,
        };

        let ticket = self
            .ticket_repo
            .create(&NewTicket {
                title: title.to_string(),
                description: input.description.clone(),
                priority,
                created_by_id: ctx.user_id,
                customer_id,
            })
            .await?;

        tracing::info!(
            ticket_id = %ticket.id,
            created_by = %ctx.user_id,
            customer_id = %customer_id,
            priority = %ticket.priority.as_str(),
            "ticket created"
        );

        self.single_response(&ticket).await
    }

    /// Free-form status change by the ticket's current assignee.
    pub async fn update_status(
        &self,
        ctx: &UserContext,
        ticket_id: Uuid,
        status: &str,
    ) -> Result<TicketResponse, ApiError> {
        let status = TicketStatus::from_str(status)
            .ok_or_else(|| ApiError::validation(format!("Unknown status '{}'", status.trim())))?;

        match self.ticket_repo.find_by_id(ticket_id).await? {
            Some(t) if policy::is_assignee(ctx, &t) => {}
            _ => return Err(ticket_not_found(ticket_id)),
        }

        let ticket = self
            .ticket_repo
            .update_status(ticket_id, status, Utc::now())
            .await?;

        tracing::info!(
            ticket_id = %ticket_id,
            user_id = %ctx.user_id,
            status = %status.as_str(),
            "ticket status changed"
        );

        self.single_response(&ticket).await
    }

    /// Set or clear the assignee. `None` clears.
    pub async fn assign_ticket(
        &self,
        ctx: &UserContext,
        ticket_id: Uuid,
        assignee: Option<Uuid>,
    ) -> Result<TicketResponse, ApiError> {
        require_permission!(ctx, &Permission::AssignTickets);

        if self.ticket_repo.find_by_id(ticket_id).await?.is_none() {
            return Err(ticket_not_found(ticket_id));
        }

        if let Some(assignee_id) = assignee {
            let qualifies = self
                .user_repo
                .find_by_id(assignee_id)
                .await?
                .is_some_and(|u| u.is_usable() && u.is_company_member);
            if !qualifies {
                return Err(ApiError::validation(
                    "Tickets can only be assigned to an active company member",
                ));
            }
        }

        let ticket = self
            .ticket_repo
            .update_assignee(ticket_id, assignee, Utc::now())
            .await?;

        tracing::info!(
            ticket_id = %ticket_id,
            assigned_by = %ctx.user_id,
            assigned_to = ?assignee,
            "ticket assignment changed"
        );

        self.single_response(&ticket).await
    }

    async fn require_customer(&self, user_id: Uuid) -> Result<(), ApiError> {
        let qualifies = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .is_some_and(|u| u.is_usable() && !u.is_company_member);
        if qualifies {
            Ok(())
        } else {
            Err(ApiError::validation(
                "customer_id must reference an active customer account",
            ))
        }
    }

    async fn single_response(&self, ticket: &Ticket) -> Result<TicketResponse, ApiError> {
        self.to_responses(std::slice::from_ref(ticket))
            .await?
            .pop()
            .ok_or_else(|| ticket_not_found(ticket.id))
    }

    async fn to_responses(&self, tickets: &[Ticket]) -> Result<Vec<TicketResponse>, ApiError> {
        let ids = tickets.iter().flat_map(|t| {
            [Some(t.created_by_id), t.assigned_to_id, t.customer_id]
                .into_iter()
                .flatten()
        });
        let users = load_user_summaries(self.user_repo.as_ref(), ids).await?;
        let lookup = |id: Option<Uuid>| id.and_then(|id| users.get(&id).cloned());

        Ok(tickets
            .iter()
            .map(|t| {
                TicketResponse::new(
                    t,
                    lookup(Some(t.created_by_id)),
                    lookup(t.assigned_to_id),
                    lookup(t.customer_id),
                )
            })
            .collect())
    }
}

fn ticket_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Ticket {} not found", id))
}

fn parse_filter(query: &TicketListQuery) -> Result<TicketFilter, ApiError> {
    let non_blank = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let status = match non_blank(&query.status) {
        Some(s) => Some(
            TicketStatus::from_str(&s)
                .ok_or_else(|| ApiError::validation(format!("Unknown status '{}'", s)))?,
        ),
        None => None,
    };
    let priority = match non_blank(&query.priority) {
        Some(p) => Some(
            TicketPriority::from_str(&p)
                .ok_or_else(|| ApiError::validation(format!("Unknown priority '{}'", p)))?,
        ),
        None => None,
    };

    Ok(TicketFilter {
        status,
        priority,
        search: non_blank(&query.search),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rbac::Role;
    use crate::services::attachment_service::{AttachmentLimits, UploadedFile};
    use crate::services::file_storage::LocalFileStorage;
    use crate::test_support::InMemoryDatabase;

    struct Fixture {
        db: Arc<InMemoryDatabase>,
        tickets: TicketService,
        messages: Arc<MessageService>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let db = InMemoryDatabase::new();
        let repos = db.repositories();
        let settings = Arc::new(Settings::new_with_env_file(false).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let messages = Arc::new(MessageService::new(
            AttachmentLimits::from_settings(&settings),
            repos.tickets.clone(),
            repos.messages.clone(),
            repos.attachments.clone(),
            repos.users.clone(),
            Arc::new(LocalFileStorage::new(dir.path())),
        ));
        let tickets = TicketService::new(
            settings,
            repos.tickets.clone(),
            repos.users.clone(),
            repos.time_logs.clone(),
            messages.clone(),
        );
        Fixture {
            db,
            tickets,
            messages,
            _dir: dir,
        }
    }

    fn create(title: &str) -> TicketCreate {
        TicketCreate {
            title: title.to_string(),
            description: "Details".to_string(),
            priority: None,
            customer_id: None,
        }
    }

    #[tokio::test]
    async fn test_customer_creates_ticket_for_self() {
        let f = fixture();
        let customer = f.db.context(&f.db.add_customer("carol"));

        let mut input = create("Cannot log in");
        input.customer_id = Some(Uuid::new_v4());
        let ticket = f.tickets.create_ticket(&customer, &input).await.unwrap();

        assert_eq!(ticket.status, TicketStatus::InProgress);
        assert_eq!(ticket.priority, TicketPriority::Medium);
        assert_eq!(ticket.customer.as_ref().map(|c| c.id), Some(customer.user_id));
        assert_eq!(ticket.created_by.as_ref().map(|c| c.id), Some(customer.user_id));
        assert!(ticket.assigned_to.is_none());
    }

    #[tokio::test]
    async fn test_staff_may_open_ticket_for_customer() {
        let f = fixture();
        let staff = f.db.context(&f.db.add_staff("sam", &[Role::Support]));
        let customer = f.db.add_customer("carol");
        let other_staff = f.db.add_staff("sid", &[Role::Support]);

        let mut input = create("Onboarding call");
        input.customer_id = Some(customer.id);
        let ticket = f.tickets.create_ticket(&staff, &input).await.unwrap();
        assert_eq!(ticket.customer.map(|c| c.id), Some(customer.id));

        input.customer_id = Some(other_staff.id);
        let err = f.tickets.create_ticket(&staff, &input).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let f = fixture();
        let customer = f.db.context(&f.db.add_customer("carol"));

        let err = f.tickets.create_ticket(&customer, &create("   ")).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let long = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(f.tickets.create_ticket(&customer, &create(&long)).await.is_err());

        let mut bad_priority = create("ok");
        bad_priority.priority = Some("critical".to_string());
        assert!(matches!(
            f.tickets.create_ticket(&customer, &bad_priority).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_only_assignee_changes_status() {
        let f = fixture();
        let admin = f.db.context(&f.db.add_admin("ada"));
        let customer = f.db.context(&f.db.add_customer("carol"));
        let staff = f.db.context(&f.db.add_staff("sam", &[Role::Support]));

        let ticket = f.tickets.create_ticket(&customer, &create("Broken")).await.unwrap();

        let err = f.tickets.update_status(&staff, ticket.id, "OnHold").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        f.tickets
            .assign_ticket(&admin, ticket.id, Some(staff.user_id))
            .await
            .unwrap();
        let updated = f.tickets.update_status(&staff, ticket.id, "on_hold").await.unwrap();
        assert_eq!(updated.status, TicketStatus::OnHold);
        assert!(updated.last_activity_at.is_some());

        let err = f.tickets.update_status(&staff, ticket.id, "closed").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = f.tickets.update_status(&customer, ticket.id, "Completed").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_assignment_rules() {
        let f = fixture();
        let admin = f.db.context(&f.db.add_admin("ada"));
        let staff = f.db.context(&f.db.add_staff("sam", &[Role::Support]));
        let customer = f.db.context(&f.db.add_customer("carol"));
        let ticket = f.tickets.create_ticket(&customer, &create("Broken")).await.unwrap();

        let err = f
            .tickets
            .assign_ticket(&staff, ticket.id, Some(staff.user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let err = f
            .tickets
            .assign_ticket(&admin, ticket.id, Some(customer.user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let assigned = f
            .tickets
            .assign_ticket(&admin, ticket.id, Some(staff.user_id))
            .await
            .unwrap();
        assert_eq!(assigned.assigned_to.map(|u| u.id), Some(staff.user_id));

        let cleared = f.tickets.assign_ticket(&admin, ticket.id, None).await.unwrap();
        assert!(cleared.assigned_to.is_none());

        let err = f
            .tickets
            .assign_ticket(&admin, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_listing_is_scoped_and_filtered() {
        let f = fixture();
        let admin = f.db.context(&f.db.add_admin("ada"));
        let carol = f.db.context(&f.db.add_customer("carol"));
        let dave = f.db.context(&f.db.add_customer("dave"));

        f.tickets.create_ticket(&carol, &create("Printer jam")).await.unwrap();
        let mut urgent = create("Server down");
        urgent.priority = Some("Urgent".to_string());
        f.tickets.create_ticket(&carol, &urgent).await.unwrap();
        f.tickets.create_ticket(&dave, &create("Invoice question")).await.unwrap();

        let query = TicketListQuery::default();
        let mine = f.tickets.list_my_tickets(&carol, &query).await.unwrap();
        assert_eq!(mine.total_count, 2);

        let filtered = f
            .tickets
            .list_my_tickets(
                &carol,
                &TicketListQuery {
                    priority: Some("urgent".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.items.len(), 1);
        assert_eq!(filtered.items[0].title, "Server down");

        let searched = f
            .tickets
            .list_my_tickets(
                &carol,
                &TicketListQuery {
                    search: Some("PRINTER".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(searched.total_count, 1);

        let all = f.tickets.list_all_tickets(&admin, &query).await.unwrap();
        assert_eq!(all.total_count, 3);

        let err = f.tickets.list_all_tickets(&carol, &query).await.unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let bad_page = TicketListQuery {
            page_size: Some(1000),
            ..Default::default()
        };
        assert!(matches!(
            f.tickets.list_my_tickets(&carol, &bad_page).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_detail_includes_thread_and_time() {
        let f = fixture();
        let admin = f.db.context(&f.db.add_admin("ada"));
        let carol = f.db.context(&f.db.add_customer("carol"));
        let dave = f.db.context(&f.db.add_customer("dave"));
        let ticket = f.tickets.create_ticket(&carol, &create("Broken")).await.unwrap();

        f.messages
            .send_message(
                &carol,
                ticket.id,
                "Here is a screenshot".to_string(),
                vec![UploadedFile::new("shot.png", Some("image/png"), &b"png"[..])],
            )
            .await
            .unwrap();
        f.db.insert_finished_time_log(ticket.id, admin.user_id, 90);

        let detail = f.tickets.get_ticket_detail(&carol, ticket.id).await.unwrap();
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.messages[0].attachments.len(), 1);
        assert_eq!(detail.total_time_spent_seconds, 90);
        assert_eq!(detail.ticket.status, TicketStatus::CustomerReplied);

        // no relationship, no detail: admins included
        let err = f.tickets.get_ticket_detail(&admin, ticket.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        let err = f.tickets.get_ticket_detail(&dave, ticket.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
