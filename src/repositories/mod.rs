pub mod attachment_repo;
pub mod message_repo;
pub mod ticket_repo;
pub mod time_log_repo;
pub mod user_repo;

pub use attachment_repo::AttachmentRepository;
pub use message_repo::MessageRepository;
pub use ticket_repo::TicketRepository;
pub use time_log_repo::TimeLogRepository;
pub use user_repo::UserRepository;

use std::sync::Arc;

/// The full set of storage handles the services are wired from
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository + Send + Sync>,
    pub tickets: Arc<dyn TicketRepository + Send + Sync>,
    pub messages: Arc<dyn MessageRepository + Send + Sync>,
    pub attachments: Arc<dyn AttachmentRepository + Send + Sync>,
    pub time_logs: Arc<dyn TimeLogRepository + Send + Sync>,
}

impl Repositories {
    pub fn postgres(pool: crate::database::DatabasePool) -> Self {
        Self {
            users: Arc::new(user_repo::SqlxUserRepository::new(pool.clone())),
            tickets: Arc::new(ticket_repo::SqlxTicketRepository::new(pool.clone())),
            messages: Arc::new(message_repo::SqlxMessageRepository::new(pool.clone())),
            attachments: Arc::new(attachment_repo::SqlxAttachmentRepository::new(pool.clone())),
            time_logs: Arc::new(time_log_repo::SqlxTimeLogRepository::new(pool)),
        }
    }
}

/// `%term%` for ILIKE with the LIKE wildcards in `term` escaped.
/// Blank terms yield `None` so the filter is skipped.
pub(crate) fn contains_pattern(term: Option<&str>) -> Option<String> {
    let term = term.map(str::trim).filter(|s| !s.is_empty())?;
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{}%", escaped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern(Some("50%_off")), Some("%50\\%\\_off%".to_string()));
        assert_eq!(contains_pattern(Some("  ")), None);
        assert_eq!(contains_pattern(None), None);
    }
}
