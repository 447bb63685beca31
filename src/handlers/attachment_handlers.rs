use crate::auth::context::UserContext;
use crate::{error::ApiError, AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    Extension,
};
use uuid::Uuid;

/// Quote-safe file name for a `Content-Disposition` header.
fn disposition_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

pub async fn download_attachment(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let (attachment, bytes) = state.attachment_service.download(&user, id).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, attachment.content_type.as_str())
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                disposition_file_name(&attachment.file_name)
            ),
        )
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal(format!("Failed to build download response: {}", e)))
}
