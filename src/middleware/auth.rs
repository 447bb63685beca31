use crate::auth::session::{UserSession, SESSION_COOKIE};
use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::PrivateCookieJar;

/// Session authentication for protected routes.
///
/// The encrypted session cookie only names the caller; the user row is
/// re-read on every request so deactivated or deleted accounts lose access
/// immediately. On success a [`UserContext`](crate::auth::UserContext) is
/// attached as a request extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| serde_json::from_str::<UserSession>(cookie.value()).ok())
        .ok_or_else(|| ApiError::authentication("Authentication required"))?;

    if session.is_expired() {
        tracing::debug!(user_id = %session.user_id, "session expired");
        return Err(ApiError::authentication("Session expired"));
    }

    let context = state
        .auth_service
        .resolve_context(session.user_id)
        .await?
        .ok_or_else(|| {
            tracing::info!(user_id = %session.user_id, "session for unusable account rejected");
            ApiError::authentication("Account is inactive or deleted")
        })?;

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
