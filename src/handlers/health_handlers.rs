use crate::{database, error::ApiError, AppState};
use axum::{extract::State, response::Json};
use serde_json::{json, Value};

/// Database status as a JSON check entry. Without a configured pool the
/// check is reported as skipped.
async fn check_database(app_state: &AppState) -> Value {
    let Some(pool) = app_state.db_pool.as_ref() else {
        return json!({ "healthy": true, "message": "No database configured" });
    };

    match database::health_check(pool).await {
        Ok(()) => json!({ "healthy": true, "message": "Database connection successful" }),
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            json!({ "healthy": false, "message": "Database connection failed" })
        }
    }
}

fn is_healthy(check: &Value) -> bool {
    check["healthy"].as_bool().unwrap_or(false)
}

pub async fn health_check(State(app_state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let database = check_database(&app_state).await;
    if !is_healthy(&database) {
        return Err(ApiError::internal("Service is unhealthy"));
    }

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": { "database": database }
    })))
}

/// Plain-text probe for load balancers.
pub async fn health_check_simple() -> &'static str {
    "OK"
}

pub async fn readiness_check(State(app_state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let database = check_database(&app_state).await;
    if !is_healthy(&database) {
        return Err(ApiError::internal("Service is not ready"));
    }

    Ok(Json(json!({
        "ready": true,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "checks": { "database": database }
    })))
}

pub async fn liveness_check() -> Json<Value> {
    Json(json!({
        "alive": true,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
