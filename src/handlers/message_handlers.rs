use crate::auth::context::UserContext;
use crate::models::MessageResponse;
use crate::services::UploadedFile;
use crate::{error::ApiError, AppState};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use uuid::Uuid;

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let messages = state.message_service.list_messages(&user, ticket_id).await?;
    Ok(Json(messages))
}

pub async fn get_message(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state.message_service.get_message(&user, id).await?;
    Ok(Json(message))
}

/// Multipart form: an optional `content` text field plus any number of
/// `files` (or `file`) parts.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(ticket_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let mut content = String::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Failed to read multipart field: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "content" => {
                content = field.text().await.map_err(|e| {
                    ApiError::Validation(format!("Failed to read message content: {}", e))
                })?;
            }
            "files" | "file" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| {
                    ApiError::Validation(format!("Failed to read file data: {}", e))
                })?;
                files.push(UploadedFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            other => {
                tracing::debug!(field = %other, "ignoring unexpected multipart field");
            }
        }
    }

    let message = state
        .message_service
        .send_message(&user, ticket_id, content, files)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
