use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    TechnicalManager,
    SalesManager,
    Accountant,
    Support,
    Seo,
    Customer,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Admin,
        Role::TechnicalManager,
        Role::SalesManager,
        Role::Accountant,
        Role::Support,
        Role::Seo,
        Role::Customer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::TechnicalManager => "TechnicalManager",
            Role::SalesManager => "SalesManager",
            Role::Accountant => "Accountant",
            Role::Support => "Support",
            Role::Seo => "Seo",
            Role::Customer => "Customer",
        }
    }

    /// Case-insensitive; underscores and spaces are ignored so that
    /// `technical_manager` and `Technical Manager` both resolve.
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().to_lowercase() == normalized)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Permission {
    // Tickets
    ViewAllTickets,
    AssignTickets,

    // Time tracking
    ViewAllTimeLogs,

    // User management
    ManageUsers,
}

impl Role {
    pub fn permissions(&self) -> Vec<Permission> {
        match self {
            Role::Admin => vec![
                Permission::ViewAllTickets,
                Permission::AssignTickets,
                Permission::ViewAllTimeLogs,
                Permission::ManageUsers,
            ],
            Role::TechnicalManager => vec![Permission::ManageUsers],
            Role::SalesManager
            | Role::Accountant
            | Role::Support
            | Role::Seo
            | Role::Customer => Vec::new(),
        }
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions().contains(permission)
    }
}

#[macro_export]
macro_rules! require_role {
    ($user:expr, $role:expr) => {
        if !$user.has_role($role) {
            return Err($crate::error::ApiError::Authorization(format!(
                "Role {} required",
                $role
            )));
        }
    };
}

#[macro_export]
macro_rules! require_permission {
    ($user:expr, $perm:expr) => {
        if !$user.has_permission($perm) {
            return Err($crate::error::ApiError::Authorization(format!(
                "Permission {:?} required",
                $perm
            )));
        }
    };
}
