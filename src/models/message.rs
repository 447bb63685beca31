use crate::models::{AttachmentResponse, UserSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub content: String,
    pub sent_by_id: Uuid,
    pub sent_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Row values for inserting a message. The id is allocated up front so
/// attachment bytes can be stored under the message's namespace before
/// the row exists.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub content: String,
    pub sent_by_id: Uuid,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub sent_by: Option<UserSummary>,
    pub attachments: Vec<AttachmentResponse>,
}
