use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the private (encrypted) cookie carrying the session payload.
pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: Uuid,
    pub username: String,
    pub expires_at: DateTime<Utc>,
    pub session_id: String,
}

impl UserSession {
    pub fn new(user_id: Uuid, username: impl Into<String>, lifetime_seconds: u64) -> Self {
        Self {
            user_id,
            username: username.into(),
            expires_at: Utc::now() + Duration::seconds(lifetime_seconds as i64),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
