pub mod attachment;
pub mod message;
pub mod pagination;
pub mod ticket;
pub mod time_log;
pub mod user;

// Re-export commonly used types
pub use attachment::*;
pub use message::*;
pub use pagination::*;
pub use ticket::*;
pub use time_log::*;
pub use user::*;
