use crate::auth::context::UserContext;
use crate::models::{
    Paged, ResetPasswordRequest, SetRolesRequest, UserCreateRequest, UserDetail, UserListQuery,
    UserSummary, UserUpdateRequest,
};
use crate::{error::ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use uuid::Uuid;

pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Paged<UserSummary>>, ApiError> {
    Ok(Json(state.user_service.list_users(&user, &query).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Json(request): Json<UserCreateRequest>,
) -> Result<(StatusCode, Json<UserDetail>), ApiError> {
    let created = state.user_service.create_user(&user, &request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserDetail>, ApiError> {
    Ok(Json(state.user_service.get_user(&user, id).await?))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UserUpdateRequest>,
) -> Result<Json<UserDetail>, ApiError> {
    Ok(Json(state.user_service.update_user(&user, id, &request).await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete_user(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_user_roles(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetRolesRequest>,
) -> Result<Json<UserDetail>, ApiError> {
    Ok(Json(
        state.user_service.set_roles(&user, id, &request.roles).await?,
    ))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .user_service
        .reset_password(&user, id, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn confirm_user(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserDetail>, ApiError> {
    Ok(Json(state.user_service.confirm_user(&user, id).await?))
}
