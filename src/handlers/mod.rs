pub mod account_handlers;
pub mod attachment_handlers;
pub mod health_handlers;
pub mod info_handlers;
pub mod message_handlers;
pub mod ticket_handlers;
pub mod time_log_handlers;
pub mod user_handlers;

pub use health_handlers::{health_check, health_check_simple, liveness_check, readiness_check};
pub use info_handlers::service_status;
