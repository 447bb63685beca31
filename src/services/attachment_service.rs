use crate::auth::context::UserContext;
use crate::auth::policy;
use crate::config::Settings;
use crate::error::ApiError;
use crate::models::Attachment;
use crate::repositories::{AttachmentRepository, MessageRepository, TicketRepository};
use crate::services::file_storage::FileStorage;
use axum::body::Bytes;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// A file received with a message, not yet validated or stored
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<&str>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            content_type: content_type.map(str::to_string),
            data: data.into(),
        }
    }
}

/// Per-message upload rules
#[derive(Debug, Clone)]
pub struct AttachmentLimits {
    pub max_files: usize,
    pub max_total_bytes: u64,
    /// Lowercase, dot-prefixed extensions
    pub allowed_extensions: Vec<String>,
}

impl AttachmentLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_files: settings.max_attachments_per_message,
            max_total_bytes: settings.max_message_upload_bytes,
            allowed_extensions: settings.attachment_allowed_extensions.clone(),
        }
    }

    /// Check the whole batch before anything is written. The first failing
    /// rule is reported.
    pub fn validate_batch(&self, files: &[UploadedFile]) -> Result<(), ApiError> {
        if files.len() > self.max_files {
            return Err(ApiError::Validation(format!(
                "At most {} files may be attached to a message",
                self.max_files
            )));
        }

        let total: u64 = files.iter().map(|f| f.data.len() as u64).sum();
        if total > self.max_total_bytes {
            return Err(ApiError::Validation(format!(
                "Attachments total {} bytes, exceeding the {} byte limit",
                total, self.max_total_bytes
            )));
        }

        for file in files {
            let name = match file.file_name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => name,
                _ => {
                    return Err(ApiError::Validation(
                        "Every attachment must have a file name".to_string(),
                    ))
                }
            };

            let extension = file_extension(name);
            if !extension
                .as_ref()
                .is_some_and(|ext| self.allowed_extensions.contains(ext))
            {
                return Err(ApiError::Validation(format!(
                    "File '{}' has a disallowed type. Allowed types: {}",
                    name,
                    self.allowed_extensions.join(", ")
                )));
            }

            if file.data.is_empty() {
                return Err(ApiError::Validation(format!("File '{}' is empty", name)));
            }
        }

        Ok(())
    }
}

/// Lowercase, dot-prefixed extension of a file name.
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/// Strip any directory components a client may have sent with the name.
pub fn display_file_name(file_name: &str) -> String {
    let trimmed = file_name.trim();
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

/// Content type for the stored file, preferring what the client declared.
pub fn resolve_content_type(declared: Option<&str>, extension: Option<&str>) -> String {
    if let Some(declared) = declared.map(str::trim).filter(|s| !s.is_empty()) {
        if declared != "application/octet-stream" {
            return declared.to_string();
        }
    }

    match extension {
        Some(".jpg") | Some(".jpeg") => "image/jpeg",
        Some(".png") => "image/png",
        Some(".pdf") => "application/pdf",
        Some(".doc") => "application/msword",
        Some(".docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
    .to_string()
}

pub struct AttachmentService {
    attachment_repo: Arc<dyn AttachmentRepository + Send + Sync>,
    message_repo: Arc<dyn MessageRepository + Send + Sync>,
    ticket_repo: Arc<dyn TicketRepository + Send + Sync>,
    storage: Arc<dyn FileStorage>,
}

impl AttachmentService {
    pub fn new(
        attachment_repo: Arc<dyn AttachmentRepository + Send + Sync>,
        message_repo: Arc<dyn MessageRepository + Send + Sync>,
        ticket_repo: Arc<dyn TicketRepository + Send + Sync>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            attachment_repo,
            message_repo,
            ticket_repo,
            storage,
        }
    }

    /// Resolve attachment, message and ticket, check read access, and load
    /// the bytes. Any missing link or a denied ticket is `NotFound`.
    pub async fn download(
        &self,
        ctx: &UserContext,
        attachment_id: Uuid,
    ) -> Result<(Attachment, Vec<u8>), ApiError> {
        let not_found = || ApiError::NotFound(format!("Attachment {} not found", attachment_id));

        let attachment = self
            .attachment_repo
            .find_by_id(attachment_id)
            .await?
            .ok_or_else(not_found)?;

        let message = self
            .message_repo
            .find_by_id(attachment.message_id)
            .await?
            .ok_or_else(not_found)?;

        let ticket = self
            .ticket_repo
            .find_by_id(message.ticket_id)
            .await?
            .ok_or_else(not_found)?;

        if !policy::can_access_ticket(ctx, &ticket) {
            tracing::info!(
                user_id = %ctx.user_id,
                attachment_id = %attachment_id,
                "attachment download denied"
            );
            return Err(not_found());
        }

        let bytes = match self.storage.read(&attachment.file_path).await {
            Ok(bytes) => bytes,
            Err(ApiError::NotFound(_)) => {
                tracing::warn!(
                    attachment_id = %attachment_id,
                    "attachment row has no stored content"
                );
                return Err(not_found());
            }
            Err(e) => return Err(e),
        };

        Ok((attachment, bytes))
    }
}
