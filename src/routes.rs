use crate::{handlers, middleware, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

/// Headroom over the attachment budget for multipart framing and the
/// text part of a message.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the full application router with global middleware applied.
pub fn create_router(app_state: AppState) -> Router {
    let upload_limit =
        app_state.config.max_message_upload_bytes as usize + MULTIPART_OVERHEAD_BYTES;

    let public_routes = Router::new()
        // Health check endpoints
        .route("/api/health", get(handlers::health_check))
        .route("/api/health/simple", get(handlers::health_check_simple))
        .route("/api/health/ready", get(handlers::readiness_check))
        .route("/api/health/live", get(handlers::liveness_check))
        .route("/api/info/status", get(handlers::service_status))
        // Account endpoints
        .route("/api/account/login", post(handlers::account_handlers::login))
        .route("/api/account/logout", post(handlers::account_handlers::logout))
        .route("/api/account/register", post(handlers::account_handlers::register));

    let protected_routes = Router::new()
        .route("/api/account/status", get(handlers::account_handlers::account_status))
        // Tickets
        .route("/api/tickets/my", get(handlers::ticket_handlers::list_my_tickets))
        .route(
            "/api/tickets",
            get(handlers::ticket_handlers::list_all_tickets)
                .post(handlers::ticket_handlers::create_ticket),
        )
        .route("/api/tickets/:id", get(handlers::ticket_handlers::get_ticket))
        .route(
            "/api/tickets/:id/status",
            put(handlers::ticket_handlers::update_ticket_status),
        )
        .route("/api/tickets/:id/assign", put(handlers::ticket_handlers::assign_ticket))
        // Messages and attachments
        .route(
            "/api/tickets/:id/messages",
            get(handlers::message_handlers::list_messages)
                .post(handlers::message_handlers::send_message)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/messages/:id", get(handlers::message_handlers::get_message))
        .route(
            "/api/attachments/:id/download",
            get(handlers::attachment_handlers::download_attachment),
        )
        // Time tracking
        .route(
            "/api/tickets/:id/time-logs",
            get(handlers::time_log_handlers::list_time_logs),
        )
        .route(
            "/api/tickets/:id/time-logs/start",
            post(handlers::time_log_handlers::start_timer),
        )
        .route("/api/time-logs/:id/stop", post(handlers::time_log_handlers::stop_timer))
        // User management
        .route(
            "/api/users",
            get(handlers::user_handlers::list_users).post(handlers::user_handlers::create_user),
        )
        .route(
            "/api/users/:id",
            get(handlers::user_handlers::get_user)
                .put(handlers::user_handlers::update_user)
                .delete(handlers::user_handlers::delete_user),
        )
        .route("/api/users/:id/roles", put(handlers::user_handlers::set_user_roles))
        .route(
            "/api/users/:id/reset-password",
            post(handlers::user_handlers::reset_password),
        )
        .route("/api/users/:id/confirm", put(handlers::user_handlers::confirm_user))
        .route_layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            middleware::auth::auth_middleware,
        ));

    let cors_layer = middleware::create_cors_layer(&app_state.config.cors_allow_origins);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers_middleware))
        .layer(axum::middleware::from_fn(middleware::request_logging_middleware))
        .layer(middleware::create_logging_layer())
        .layer(cors_layer)
}
