use crate::auth::context::UserContext;
use crate::models::{
    Paged, TicketAssign, TicketCreate, TicketDetailResponse, TicketListQuery, TicketResponse,
    TicketStatusUpdate,
};
use crate::{error::ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use uuid::Uuid;

pub async fn list_my_tickets(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<TicketListQuery>,
) -> Result<Json<Paged<TicketResponse>>, ApiError> {
    let tickets = state.ticket_service.list_my_tickets(&user, &query).await?;
    Ok(Json(tickets))
}

pub async fn list_all_tickets(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<TicketListQuery>,
) -> Result<Json<Paged<TicketResponse>>, ApiError> {
    let tickets = state.ticket_service.list_all_tickets(&user, &query).await?;
    Ok(Json(tickets))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Json(input): Json<TicketCreate>,
) -> Result<(StatusCode, Json<TicketResponse>), ApiError> {
    let ticket = state.ticket_service.create_ticket(&user, &input).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketDetailResponse>, ApiError> {
    let ticket = state.ticket_service.get_ticket_detail(&user, id).await?;
    Ok(Json(ticket))
}

pub async fn update_ticket_status(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(update): Json<TicketStatusUpdate>,
) -> Result<Json<TicketResponse>, ApiError> {
    let ticket = state
        .ticket_service
        .update_status(&user, id, &update.status)
        .await?;
    Ok(Json(ticket))
}

pub async fn assign_ticket(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(assign): Json<TicketAssign>,
) -> Result<Json<TicketResponse>, ApiError> {
    let ticket = state
        .ticket_service
        .assign_ticket(&user, id, assign.assigned_to_id)
        .await?;
    Ok(Json(ticket))
}
