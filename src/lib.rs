use crate::{
    config::Settings,
    database::DatabasePool,
    error::ApiError,
    repositories::{Repositories, UserRepository},
    services::{
        AttachmentLimits, AttachmentService, AuthService, FileStorage, LocalFileStorage,
        MessageService, TicketService, TimeLogService, UserService,
    },
};
use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod utils;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    /// `None` when the state is assembled over non-Postgres repositories.
    pub db_pool: Option<DatabasePool>,
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub ticket_service: Arc<TicketService>,
    pub message_service: Arc<MessageService>,
    pub attachment_service: Arc<AttachmentService>,
    pub time_log_service: Arc<TimeLogService>,
    pub user_repository: Arc<dyn UserRepository + Send + Sync>,
    pub key: Key,
}

// Implement FromRef to allow extracting Key from AppState
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl AppState {
    /// Connect to the configured database (running migrations) and wire
    /// the Postgres-backed services.
    pub async fn new(config: Settings) -> Result<Self, ApiError> {
        let db_pool = database::create_connection_pool(&config.database_url).await?;
        Self::new_with_pool(config, db_pool)
    }

    pub fn new_with_pool(config: Settings, db_pool: DatabasePool) -> Result<Self, ApiError> {
        let storage: Arc<dyn FileStorage> =
            Arc::new(LocalFileStorage::new(&config.attachment_storage_path));
        let repositories = Repositories::postgres(db_pool.clone());
        Self::from_parts(config, Some(db_pool), repositories, storage)
    }

    /// Wire services over arbitrary repository and storage implementations.
    pub fn from_parts(
        config: Settings,
        db_pool: Option<DatabasePool>,
        repositories: Repositories,
        storage: Arc<dyn FileStorage>,
    ) -> Result<Self, ApiError> {
        let key = Key::try_from(config.auth_secret.as_bytes()).map_err(|e| {
            ApiError::Configuration(format!("auth_secret cannot be used as a cookie key: {}", e))
        })?;
        let config = Arc::new(config);
        let Repositories {
            users,
            tickets,
            messages,
            attachments,
            time_logs,
        } = repositories;

        let auth_service = Arc::new(AuthService::new(config.clone(), users.clone()));
        let user_service = Arc::new(UserService::new(config.clone(), users.clone()));

        let message_service = Arc::new(MessageService::new(
            AttachmentLimits::from_settings(&config),
            tickets.clone(),
            messages.clone(),
            attachments.clone(),
            users.clone(),
            storage.clone(),
        ));

        let ticket_service = Arc::new(TicketService::new(
            config.clone(),
            tickets.clone(),
            users.clone(),
            time_logs.clone(),
            message_service.clone(),
        ));

        let attachment_service = Arc::new(AttachmentService::new(
            attachments,
            messages,
            tickets.clone(),
            storage,
        ));

        let time_log_service = Arc::new(TimeLogService::new(time_logs, tickets, users.clone()));

        Ok(Self {
            config,
            db_pool,
            auth_service,
            user_service,
            ticket_service,
            message_service,
            attachment_service,
            time_log_service,
            user_repository: users,
            key,
        })
    }
}
