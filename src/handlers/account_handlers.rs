use crate::auth::{context::UserContext, session::SESSION_COOKIE, UserSession};
use crate::models::{LoginRequest, RegisterRequest, UserDetail};
use crate::{error::ApiError, AppState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};

pub async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(params): Json<LoginRequest>,
) -> Result<(PrivateCookieJar, Json<UserSession>), ApiError> {
    let session = state
        .auth_service
        .login_local(&params.username, &params.password)
        .await?;

    let value = serde_json::to_string(&session).map_err(ApiError::Serialization)?;
    let cookie = Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .secure(state.config.is_production())
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((jar.add(cookie), Json(session)))
}

pub async fn logout(jar: PrivateCookieJar) -> (PrivateCookieJar, StatusCode) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, StatusCode::NO_CONTENT)
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth_service.register(&request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn account_status(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<UserDetail>, ApiError> {
    Ok(Json(state.auth_service.account_status(&user).await?))
}
