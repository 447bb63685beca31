//! Ticket access decisions.
//!
//! These are pure functions over the caller and the ticket row; services
//! call them after loading the ticket and turn a denial into the error the
//! operation calls for.

use crate::auth::context::UserContext;
use crate::models::Ticket;

/// Relationship-based access: staff see tickets they created or are
/// assigned to, customers see tickets they created or are the customer of.
/// Roles grant nothing here, administrators included. A soft-deleted
/// ticket is never accessible.
pub fn can_access_ticket(user: &UserContext, ticket: &Ticket) -> bool {
    if ticket.deleted_at.is_some() {
        return false;
    }

    if ticket.created_by_id == user.user_id {
        return true;
    }

    if user.is_company_member {
        ticket.assigned_to_id == Some(user.user_id)
    } else {
        ticket.customer_id == Some(user.user_id)
    }
}

/// Only the current assignee, who must be a company member, may act as the
/// ticket's worker (status changes, time tracking).
pub fn is_assignee(user: &UserContext, ticket: &Ticket) -> bool {
    user.is_company_member && ticket.assigned_to_id == Some(user.user_id)
}
