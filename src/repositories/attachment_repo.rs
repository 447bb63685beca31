use crate::database::DatabasePool;
use crate::error::ApiError;
use crate::models::Attachment;
use async_trait::async_trait;
use uuid::Uuid;

const ATTACHMENT_COLUMNS: &str =
    "id, message_id, file_name, file_path, size, content_type, created_at, deleted_at";

#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    /// Non-deleted attachment by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>, ApiError>;
    /// Non-deleted attachments belonging to any of `message_ids`.
    async fn list_by_messages(&self, message_ids: &[Uuid]) -> Result<Vec<Attachment>, ApiError>;
}

pub struct SqlxAttachmentRepository {
    pool: DatabasePool,
}

impl SqlxAttachmentRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentRepository for SqlxAttachmentRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>, ApiError> {
        let sql = format!(
            "SELECT {} FROM attachments WHERE id = $1 AND deleted_at IS NULL",
            ATTACHMENT_COLUMNS
        );
        let attachment = sqlx::query_as::<_, Attachment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(attachment)
    }

    async fn list_by_messages(&self, message_ids: &[Uuid]) -> Result<Vec<Attachment>, ApiError> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM attachments WHERE message_id = ANY($1) AND deleted_at IS NULL \
             ORDER BY created_at ASC, file_name ASC",
            ATTACHMENT_COLUMNS
        );
        let attachments = sqlx::query_as::<_, Attachment>(&sql)
            .bind(message_ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(attachments)
    }
}
