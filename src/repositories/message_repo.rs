use crate::database::DatabasePool;
use crate::error::ApiError;
use crate::models::{Attachment, Message, NewAttachment, NewMessage, TicketStatus};
use async_trait::async_trait;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, ticket_id, content, sent_by_id, sent_at, deleted_at";

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Non-deleted message by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, ApiError>;
    /// Non-deleted messages of a ticket, oldest first.
    async fn list_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<Message>, ApiError>;
    /// Insert the message and its attachment rows in one transaction. When
    /// `customer_reply` is set the ticket moves to `CustomerReplied` and its
    /// activity timestamps are refreshed inside the same transaction.
    async fn create_with_attachments(
        &self,
        message: &NewMessage,
        attachments: &[NewAttachment],
        customer_reply: bool,
    ) -> Result<(Message, Vec<Attachment>), ApiError>;
}

pub struct SqlxMessageRepository {
    pool: DatabasePool,
}

impl SqlxMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for SqlxMessageRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, ApiError> {
        let sql = format!(
            "SELECT {} FROM messages WHERE id = $1 AND deleted_at IS NULL",
            MESSAGE_COLUMNS
        );
        let message = sqlx::query_as::<_, Message>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(message)
    }

    async fn list_by_ticket(&self, ticket_id: Uuid) -> Result<Vec<Message>, ApiError> {
        let sql = format!(
            "SELECT {} FROM messages WHERE ticket_id = $1 AND deleted_at IS NULL \
             ORDER BY sent_at ASC, id ASC",
            MESSAGE_COLUMNS
        );
        let messages = sqlx::query_as::<_, Message>(&sql)
            .bind(ticket_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(messages)
    }

    async fn create_with_attachments(
        &self,
        message: &NewMessage,
        attachments: &[NewAttachment],
        customer_reply: bool,
    ) -> Result<(Message, Vec<Attachment>), ApiError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO messages (id, ticket_id, content, sent_by_id, sent_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            MESSAGE_COLUMNS
        );
        let created = sqlx::query_as::<_, Message>(&sql)
            .bind(message.id)
            .bind(message.ticket_id)
            .bind(&message.content)
            .bind(message.sent_by_id)
            .bind(message.sent_at)
            .fetch_one(&mut *tx)
            .await?;

        let mut stored = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let row = sqlx::query_as::<_, Attachment>(
                "INSERT INTO attachments (id, message_id, file_name, file_path, size, content_type, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING id, message_id, file_name, file_path, size, content_type, created_at, deleted_at",
            )
            .bind(attachment.id)
            .bind(created.id)
            .bind(&attachment.file_name)
            .bind(&attachment.file_path)
            .bind(attachment.size)
            .bind(&attachment.content_type)
            .bind(message.sent_at)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(row);
        }

        if customer_reply {
            sqlx::query(
                "UPDATE tickets SET status = $2, last_activity_at = $3, updated_at = $3 \
                 WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(message.ticket_id)
            .bind(TicketStatus::CustomerReplied)
            .bind(message.sent_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((created, stored))
    }
}
