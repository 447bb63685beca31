use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Attachment {
    pub id: Uuid,
    pub message_id: Uuid,
    pub file_name: String,
    /// Opaque storage reference; never sent to clients.
    #[serde(skip)]
    pub file_path: String,
    pub size: i64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Row values for inserting an attachment
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub size: i64,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub file_name: String,
    pub size: i64,
    pub content_type: String,
    pub download_url: String,
}

impl From<&Attachment> for AttachmentResponse {
    fn from(attachment: &Attachment) -> Self {
        Self {
            id: attachment.id,
            file_name: attachment.file_name.clone(),
            size: attachment.size,
            content_type: attachment.content_type.clone(),
            download_url: download_url(attachment.id),
        }
    }
}

pub fn download_url(attachment_id: Uuid) -> String {
    format!("/api/attachments/{}/download", attachment_id)
}
