use crate::auth::context::UserContext;
use crate::models::TimeLogResponse;
use crate::{error::ApiError, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use uuid::Uuid;

pub async fn start_timer(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(ticket_id): Path<Uuid>,
) -> Result<(StatusCode, Json<TimeLogResponse>), ApiError> {
    let log = state.time_log_service.start(&user, ticket_id).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

pub async fn stop_timer(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<TimeLogResponse>, ApiError> {
    let log = state.time_log_service.stop(&user, id).await?;
    Ok(Json(log))
}

pub async fn list_time_logs(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Vec<TimeLogResponse>>, ApiError> {
    let logs = state
        .time_log_service
        .list_for_ticket(&user, ticket_id)
        .await?;
    Ok(Json(logs))
}
