use crate::auth::rbac::{Permission, Role};
use crate::models::User;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated caller, resolved once per request by the auth
/// middleware and passed explicitly into every service call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub username: String,
    pub full_name: String,
    pub is_company_member: bool,
    pub roles: Vec<Role>,
}

impl UserContext {
    pub fn new_user(user: &User, roles: Vec<Role>) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            is_company_member: user.is_company_member,
            roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.roles.iter().any(|r| r.has_permission(permission))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}
