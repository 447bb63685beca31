use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// SQLSTATE raised by PostgreSQL for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Conflict error: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl ApiError {
    /// Create a new validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a new authentication error
    pub fn authentication<T: Into<String>>(msg: T) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a new authorization error
    pub fn authorization<T: Into<String>>(msg: T) -> Self {
        Self::Authorization(msg.into())
    }

    /// Create a new conflict error
    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        Self::Conflict(msg.into())
    }

    /// Turn a unique constraint violation into a conflict carrying `msg`,
    /// leaving every other database error untouched.
    pub fn from_unique_violation<T: Into<String>>(err: sqlx::Error, msg: T) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Self::Conflict(msg.into())
            }
            _ => Self::Database(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4();

        let (status, error_message, error_code) = match self {
            ApiError::Database(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "database error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error",
                    "DATABASE_ERROR",
                )
            }
            ApiError::Validation(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "validation error occurred"
                );
                (StatusCode::BAD_REQUEST, msg.as_str(), "VALIDATION_ERROR")
            }
            ApiError::NotFound(ref msg) => {
                tracing::info!(
                    error_id = %error_id,
                    error = %msg,
                    "resource not found"
                );
                (StatusCode::NOT_FOUND, msg.as_str(), "NOT_FOUND")
            }
            ApiError::Config(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "configuration error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error",
                    "CONFIG_ERROR",
                )
            }
            ApiError::Configuration(ref msg) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %msg,
                    "configuration error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    msg.as_str(),
                    "CONFIG_ERROR",
                )
            }
            ApiError::Io(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "IO error occurred"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, "IO error", "IO_ERROR")
            }
            ApiError::Serialization(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "serialization error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Serialization error",
                    "SERIALIZATION_ERROR",
                )
            }
            ApiError::Migration(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "database migration error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database migration error",
                    "MIGRATION_ERROR",
                )
            }
            ApiError::Authentication(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "authentication error occurred"
                );
                (
                    StatusCode::UNAUTHORIZED,
                    msg.as_str(),
                    "AUTHENTICATION_ERROR",
                )
            }
            ApiError::Authorization(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "authorization error occurred"
                );
                (StatusCode::FORBIDDEN, msg.as_str(), "AUTHORIZATION_ERROR")
            }
            ApiError::Conflict(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "conflict error occurred"
                );
                (StatusCode::CONFLICT, msg.as_str(), "CONFLICT_ERROR")
            }
            ApiError::Internal(ref msg) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %msg,
                    "internal server error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    msg.as_str(),
                    "INTERNAL_ERROR",
                )
            }
            ApiError::Anyhow(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "unexpected error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    "INTERNAL_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "code": error_code,
                "error_id": error_id,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
