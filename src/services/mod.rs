pub mod attachment_service;
pub mod auth_service;
pub mod file_storage;
pub mod message_service;
pub mod ticket_service;
pub mod time_log_service;
pub mod user_service;

// Re-export commonly used types
pub use attachment_service::{AttachmentLimits, AttachmentService, UploadedFile};
pub use auth_service::AuthService;
pub use file_storage::{FileStorage, LocalFileStorage};
pub use message_service::MessageService;
pub use ticket_service::TicketService;
pub use time_log_service::TimeLogService;
pub use user_service::UserService;

use crate::error::ApiError;
use crate::models::UserSummary;
use crate::repositories::UserRepository;
use std::collections::HashMap;
use uuid::Uuid;

/// Display summaries for a set of user ids, soft-deleted users included.
pub(crate) async fn load_user_summaries(
    user_repo: &dyn UserRepository,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, UserSummary>, ApiError> {
    let mut ids: Vec<Uuid> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();

    let users = user_repo.find_for_display(&ids).await?;
    Ok(users
        .iter()
        .map(|user| (user.id, UserSummary::from(user)))
        .collect())
}
