use crate::models::{MessageResponse, UserSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MAX_TITLE_LENGTH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
pub enum TicketStatus {
    InProgress,
    Replied,
    WaitingForCustomer,
    OnHold,
    CustomerReplied,
    Completed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        TicketStatus::InProgress,
        TicketStatus::Replied,
        TicketStatus::WaitingForCustomer,
        TicketStatus::OnHold,
        TicketStatus::CustomerReplied,
        TicketStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::InProgress => "InProgress",
            TicketStatus::Replied => "Replied",
            TicketStatus::WaitingForCustomer => "WaitingForCustomer",
            TicketStatus::OnHold => "OnHold",
            TicketStatus::CustomerReplied => "CustomerReplied",
            TicketStatus::Completed => "Completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let key = enum_key(s);
        TicketStatus::ALL
            .into_iter()
            .find(|status| status.as_str().to_lowercase() == key)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "ticket_priority", rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub const ALL: [TicketPriority; 4] = [
        TicketPriority::Low,
        TicketPriority::Medium,
        TicketPriority::High,
        TicketPriority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "Low",
            TicketPriority::Medium => "Medium",
            TicketPriority::High => "High",
            TicketPriority::Urgent => "Urgent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let key = enum_key(s);
        TicketPriority::ALL
            .into_iter()
            .find(|priority| priority.as_str().to_lowercase() == key)
    }
}

/// Lowercase with `_`, `-` and spaces stripped, so `on_hold`, `On Hold`
/// and `OnHold` all compare equal.
fn enum_key(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .collect::<String>()
        .to_lowercase()
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_by_id: Uuid,
    pub assigned_to_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Row values for inserting a ticket
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
    pub created_by_id: Uuid,
    pub customer_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketCreate {
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketStatusUpdate {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketAssign {
    pub assigned_to_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
}

/// Which tickets a listing may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketScope {
    All,
    /// Created by or assigned to this staff member
    CompanyMember(Uuid),
    /// Created by or raised for this customer
    Customer(Uuid),
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub search: Option<String>,
}

impl TicketFilter {
    /// True when `ticket` satisfies every populated criterion.
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if let Some(status) = self.status {
            if ticket.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if ticket.priority != priority {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref() {
            let needle = search.to_lowercase();
            if !ticket.title.to_lowercase().contains(&needle)
                && !ticket.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

impl TicketScope {
    pub fn includes(&self, ticket: &Ticket) -> bool {
        match *self {
            TicketScope::All => true,
            TicketScope::CompanyMember(id) => {
                ticket.created_by_id == id || ticket.assigned_to_id == Some(id)
            }
            TicketScope::Customer(id) => {
                ticket.created_by_id == id || ticket.customer_id == Some(id)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_by: Option<UserSummary>,
    pub assigned_to: Option<UserSummary>,
    pub customer: Option<UserSummary>,
}

impl TicketResponse {
    pub fn new(
        ticket: &Ticket,
        created_by: Option<UserSummary>,
        assigned_to: Option<UserSummary>,
        customer: Option<UserSummary>,
    ) -> Self {
        Self {
            id: ticket.id,
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            status: ticket.status,
            priority: ticket.priority,
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
            last_activity_at: ticket.last_activity_at,
            created_by,
            assigned_to,
            customer,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketDetailResponse {
    #[serde(flatten)]
    pub ticket: TicketResponse,
    pub messages: Vec<MessageResponse>,
    pub total_time_spent_seconds: i64,
}
