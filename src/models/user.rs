use crate::auth::rbac::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub is_company_member: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Inactive or soft-deleted accounts are treated as absent for every
    /// authorization decision.
    pub fn is_usable(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

/// Compact user view embedded in tickets, messages and lists
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub is_company_member: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            is_company_member: user.is_company_member,
            is_active: user.is_active,
            created_at: user.created_at,
            deleted_at: user.deleted_at,
        }
    }
}

/// User view with roles, returned by account status and user management
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: UserSummary,
    pub last_login_at: Option<DateTime<Utc>>,
    pub roles: Vec<Role>,
}

impl UserDetail {
    pub fn new(user: &User, roles: Vec<Role>) -> Self {
        Self {
            user: UserSummary::from(user),
            last_login_at: user.last_login_at,
            roles,
        }
    }
}

/// Row values for inserting a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub is_company_member: bool,
    pub is_active: bool,
}

/// Row values for updating a user's profile
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub is_company_member: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub is_company_member: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserCreateRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: Option<String>,
    #[serde(default)]
    pub is_company_member: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserUpdateRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub is_company_member: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRolesRequest {
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub is_company_member: Option<bool>,
    pub search: Option<String>,
}

fn default_true() -> bool {
    true
}
