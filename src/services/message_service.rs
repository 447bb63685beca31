use crate::auth::context::UserContext;
use crate::auth::policy;
use crate::error::ApiError;
use crate::models::{
    AttachmentResponse, Message, MessageResponse, NewAttachment, NewMessage, Ticket,
};
use crate::repositories::{
    AttachmentRepository, MessageRepository, TicketRepository, UserRepository,
};
use crate::services::attachment_service::{
    display_file_name, file_extension, resolve_content_type, AttachmentLimits, UploadedFile,
};
use crate::services::file_storage::FileStorage;
use crate::services::load_user_summaries;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct MessageService {
    limits: AttachmentLimits,
    ticket_repo: Arc<dyn TicketRepository + Send + Sync>,
    message_repo: Arc<dyn MessageRepository + Send + Sync>,
    attachment_repo: Arc<dyn AttachmentRepository + Send + Sync>,
    user_repo: Arc<dyn UserRepository + Send + Sync>,
    storage: Arc<dyn FileStorage>,
}

impl MessageService {
    pub fn new(
        limits: AttachmentLimits,
        ticket_repo: Arc<dyn TicketRepository + Send + Sync>,
        message_repo: Arc<dyn MessageRepository + Send + Sync>,
        attachment_repo: Arc<dyn AttachmentRepository + Send + Sync>,
        user_repo: Arc<dyn UserRepository + Send + Sync>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            limits,
            ticket_repo,
            message_repo,
            attachment_repo,
            user_repo,
            storage,
        }
    }

    /// Post a message with optional attachments on a ticket the caller
    /// participates in.
    ///
    /// The attachment batch is validated in full before any bytes or rows are
    /// written. Rows are committed in a single transaction together with the
    /// customer-reply status change; if that fails, the stored bytes are
    /// removed again.
    pub async fn send_message(
        &self,
        ctx: &UserContext,
        ticket_id: Uuid,
        content: String,
        files: Vec<UploadedFile>,
    ) -> Result<MessageResponse, ApiError> {
        if content.trim().is_empty() && files.is_empty() {
            return Err(ApiError::Validation(
                "A message needs text content or at least one attachment".to_string(),
            ));
        }

        self.find_ticket(ticket_id, |t| policy::can_access_ticket(ctx, t))
            .await?;

        self.limits.validate_batch(&files)?;

        let now = Utc::now();
        let message = NewMessage {
            id: Uuid::new_v4(),
            ticket_id,
            content: if content.trim().is_empty() {
                String::new()
            } else {
                content
            },
            sent_by_id: ctx.user_id,
            sent_at: now,
        };

        let mut stored_refs: Vec<String> = Vec::with_capacity(files.len());
        let mut new_attachments = Vec::with_capacity(files.len());
        for file in &files {
            let original_name = display_file_name(file.file_name.as_deref().unwrap_or_default());
            let extension = file_extension(&original_name);
            let path = format!(
                "tickets/{}/messages/{}/{}{}",
                ticket_id,
                message.id,
                Uuid::new_v4(),
                extension.as_deref().unwrap_or_default()
            );

            let storage_ref = match self.storage.save(&path, &file.data).await {
                Ok(storage_ref) => storage_ref,
                Err(e) => {
                    self.discard_stored(&stored_refs).await;
                    return Err(e);
                }
            };
            stored_refs.push(storage_ref.clone());

            new_attachments.push(NewAttachment {
                id: Uuid::new_v4(),
                file_name: original_name,
                file_path: storage_ref,
                size: file.data.len() as i64,
                content_type: resolve_content_type(
                    file.content_type.as_deref(),
                    extension.as_deref(),
                ),
            });
        }

        let customer_reply = !ctx.is_company_member;
        let (created, attachments) = match self
            .message_repo
            .create_with_attachments(&message, &new_attachments, customer_reply)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    ticket_id = %ticket_id,
                    error = %e,
                    "failed to persist message, removing stored attachments"
                );
                self.discard_stored(&stored_refs).await;
                return Err(e);
            }
        };

        tracing::info!(
            ticket_id = %ticket_id,
            message_id = %created.id,
            sender_id = %ctx.user_id,
            attachments = attachments.len(),
            customer_reply,
            "message sent"
        );

        let sender = load_user_summaries(self.user_repo.as_ref(), [ctx.user_id])
            .await?
            .remove(&ctx.user_id);

        Ok(MessageResponse {
            id: created.id,
            ticket_id: created.ticket_id,
            content: created.content,
            sent_at: created.sent_at,
            sent_by: sender,
            attachments: attachments.iter().map(AttachmentResponse::from).collect(),
        })
    }

    /// Messages of a ticket the caller may read, oldest first.
    pub async fn list_messages(
        &self,
        ctx: &UserContext,
        ticket_id: Uuid,
    ) -> Result<Vec<MessageResponse>, ApiError> {
        let ticket = self
            .find_ticket(ticket_id, |t| policy::can_access_ticket(ctx, t))
            .await?;
        self.thread(&ticket).await
    }

    pub async fn get_message(
        &self,
        ctx: &UserContext,
        message_id: Uuid,
    ) -> Result<MessageResponse, ApiError> {
        let not_found = || ApiError::NotFound(format!("Message {} not found", message_id));

        let message = self
            .message_repo
            .find_by_id(message_id)
            .await?
            .ok_or_else(not_found)?;

        let visible = self
            .ticket_repo
            .find_by_id(message.ticket_id)
            .await?
            .is_some_and(|t| policy::can_access_ticket(ctx, &t));
        if !visible {
            return Err(not_found());
        }

        let mut responses = self.build_responses(vec![message]).await?;
        responses.pop().ok_or_else(not_found)
    }

    /// The full thread of an already-authorized ticket.
    pub async fn thread(&self, ticket: &Ticket) -> Result<Vec<MessageResponse>, ApiError> {
        let messages = self.message_repo.list_by_ticket(ticket.id).await?;
        self.build_responses(messages).await
    }

    async fn build_responses(
        &self,
        messages: Vec<Message>,
    ) -> Result<Vec<MessageResponse>, ApiError> {
        let message_ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let attachments = self.attachment_repo.list_by_messages(&message_ids).await?;

        let mut by_message: HashMap<Uuid, Vec<AttachmentResponse>> = HashMap::new();
        for attachment in &attachments {
            by_message
                .entry(attachment.message_id)
                .or_default()
                .push(AttachmentResponse::from(attachment));
        }

        let senders =
            load_user_summaries(self.user_repo.as_ref(), messages.iter().map(|m| m.sent_by_id))
                .await?;

        Ok(messages
            .into_iter()
            .map(|message| MessageResponse {
                id: message.id,
                ticket_id: message.ticket_id,
                sent_by: senders.get(&message.sent_by_id).cloned(),
                attachments: by_message.remove(&message.id).unwrap_or_default(),
                content: message.content,
                sent_at: message.sent_at,
            })
            .collect())
    }

    /// Load a live ticket and apply `allowed`; a denial reads as absence.
    async fn find_ticket(
        &self,
        ticket_id: Uuid,
        allowed: impl Fn(&Ticket) -> bool,
    ) -> Result<Ticket, ApiError> {
        match self.ticket_repo.find_by_id(ticket_id).await? {
            Some(ticket) if allowed(&ticket) => Ok(ticket),
            _ => Err(ApiError::NotFound(format!("Ticket {} not found", ticket_id))),
        }
    }

    async fn discard_stored(&self, storage_refs: &[String]) {
        for storage_ref in storage_refs {
            if let Err(e) = self.storage.delete(storage_ref).await {
                tracing::warn!(
                    storage_ref = %storage_ref,
                    error = %e,
                    "failed to remove orphaned attachment content"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rbac::Role;
    use crate::models::TicketStatus;
    use crate::services::file_storage::LocalFileStorage;
    use crate::test_support::InMemoryDatabase;
    use tempfile::TempDir;

    fn limits() -> AttachmentLimits {
        AttachmentLimits {
            max_files: 5,
            max_total_bytes: 1024,
            allowed_extensions: vec![".pdf".to_string(), ".png".to_string()],
        }
    }

    fn service(db: &Arc<InMemoryDatabase>, dir: &TempDir) -> MessageService {
        let repos = db.repositories();
        MessageService::new(
            limits(),
            repos.tickets,
            repos.messages,
            repos.attachments,
            repos.users,
            Arc::new(LocalFileStorage::new(dir.path())),
        )
    }

    fn stored_files(dir: &TempDir) -> usize {
        fn walk(path: &std::path::Path) -> usize {
            std::fs::read_dir(path)
                .map(|entries| {
                    entries
                        .flatten()
                        .map(|e| {
                            let p = e.path();
                            if p.is_dir() {
                                walk(&p)
                            } else {
                                1
                            }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        walk(dir.path())
    }

    #[tokio::test]
    async fn test_customer_reply_updates_status_and_stores_files() {
        let db = InMemoryDatabase::new();
        let dir = tempfile::tempdir().unwrap();
        let messages = service(&db, &dir);
        let customer = db.add_customer("carol");
        let ticket = db.add_ticket(&customer, None);

        let sent = messages
            .send_message(
                &db.context(&customer),
                ticket.id,
                String::new(),
                vec![UploadedFile::new("invoice.PDF", None, &b"%PDF-1.4"[..])],
            )
            .await
            .unwrap();

        assert_eq!(sent.content, "");
        assert_eq!(sent.attachments.len(), 1);
        assert_eq!(sent.attachments[0].file_name, "invoice.PDF");
        assert_eq!(sent.attachments[0].content_type, "application/pdf");
        assert_eq!(sent.sent_by.as_ref().map(|u| u.id), Some(customer.id));
        assert_eq!(stored_files(&dir), 1);

        let stored = db.attachments();
        assert!(stored[0]
            .file_path
            .starts_with(&format!("tickets/{}/messages/{}/", ticket.id, sent.id)));
        assert!(stored[0].file_path.ends_with(".pdf"));

        let ticket = db.ticket(ticket.id).unwrap();
        assert_eq!(ticket.status, TicketStatus::CustomerReplied);
        assert_eq!(ticket.last_activity_at, Some(sent.sent_at));
    }

    #[tokio::test]
    async fn test_staff_reply_leaves_status() {
        let db = InMemoryDatabase::new();
        let dir = tempfile::tempdir().unwrap();
        let messages = service(&db, &dir);
        let customer = db.add_customer("carol");
        let staff = db.add_staff("sam", &[Role::Support]);
        let ticket = db.add_ticket(&customer, Some(staff.id));

        messages
            .send_message(&db.context(&staff), ticket.id, "On it".to_string(), Vec::new())
            .await
            .unwrap();

        assert_eq!(db.ticket(ticket.id).unwrap().status, TicketStatus::InProgress);
        assert_eq!(db.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_rejections_write_nothing() {
        let db = InMemoryDatabase::new();
        let dir = tempfile::tempdir().unwrap();
        let messages = service(&db, &dir);
        let customer = db.add_customer("carol");
        let ctx = db.context(&customer);
        let ticket = db.add_ticket(&customer, None);

        let err = messages
            .send_message(&ctx, ticket.id, "   ".to_string(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let files = vec![
            UploadedFile::new("ok.png", None, &b"png"[..]),
            UploadedFile::new("bad.exe", None, &b"MZ"[..]),
        ];
        let err = messages
            .send_message(&ctx, ticket.id, "see files".to_string(), files)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref m) if m.contains("bad.exe")));

        let oversized = vec![UploadedFile::new("big.pdf", None, vec![0u8; 2048])];
        assert!(messages
            .send_message(&ctx, ticket.id, String::new(), oversized)
            .await
            .is_err());

        assert!(db.messages().is_empty());
        assert!(db.attachments().is_empty());
        assert_eq!(stored_files(&dir), 0);
        assert_eq!(db.ticket(ticket.id).unwrap().status, TicketStatus::InProgress);
    }

    #[tokio::test]
    async fn test_failed_commit_removes_stored_bytes() {
        let db = InMemoryDatabase::new();
        let dir = tempfile::tempdir().unwrap();
        let messages = service(&db, &dir);
        let customer = db.add_customer("carol");
        let ticket = db.add_ticket(&customer, None);

        db.fail_message_writes(true);
        let result = messages
            .send_message(
                &db.context(&customer),
                ticket.id,
                "two files".to_string(),
                vec![
                    UploadedFile::new("a.png", None, &b"a"[..]),
                    UploadedFile::new("b.png", None, &b"b"[..]),
                ],
            )
            .await;

        assert!(result.is_err());
        assert_eq!(stored_files(&dir), 0);
        assert!(db.attachments().is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_callers_get_not_found() {
        let db = InMemoryDatabase::new();
        let dir = tempfile::tempdir().unwrap();
        let messages = service(&db, &dir);
        let customer = db.add_customer("carol");
        let outsider = db.context(&db.add_staff("sid", &[Role::Support]));
        let admin = db.context(&db.add_admin("ada"));
        let ticket = db.add_ticket(&customer, None);

        let sent = messages
            .send_message(&db.context(&customer), ticket.id, "hello".to_string(), Vec::new())
            .await
            .unwrap();

        let err = messages
            .send_message(&outsider, ticket.id, "hi".to_string(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(matches!(
            messages.list_messages(&outsider, ticket.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            messages.get_message(&outsider, sent.id).await,
            Err(ApiError::NotFound(_))
        ));

        // the Admin role does not stand in for a relationship
        assert!(matches!(
            messages.list_messages(&admin, ticket.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            messages.get_message(&admin, sent.id).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            messages
                .send_message(&admin, ticket.id, "hi".to_string(), Vec::new())
                .await,
            Err(ApiError::NotFound(_))
        ));
    }
}
