use crate::auth::context::UserContext;
use crate::auth::rbac::{Permission, Role};
use crate::config::Settings;
use crate::error::ApiError;
use crate::models::{
    NewUser, PageRequest, Paged, User, UserCreateRequest, UserDetail, UserFilter, UserListQuery,
    UserSummary, UserUpdate, UserUpdateRequest,
};
use crate::repositories::UserRepository;
use crate::require_permission;
use crate::utils::crypto::hash_password;
use crate::utils::validation::{
    validate_email, validate_full_name, validate_password, validate_username,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Administrative account management. Every operation requires
/// [`Permission::ManageUsers`].
pub struct UserService {
    settings: Arc<Settings>,
    user_repo: Arc<dyn UserRepository + Send + Sync>,
}

impl UserService {
    pub fn new(settings: Arc<Settings>, user_repo: Arc<dyn UserRepository + Send + Sync>) -> Self {
        Self {
            settings,
            user_repo,
        }
    }

    pub async fn list_users(
        &self,
        ctx: &UserContext,
        query: &UserListQuery,
    ) -> Result<Paged<UserSummary>, ApiError> {
        require_permission!(ctx, &Permission::ManageUsers);

        let page = PageRequest::resolve(
            query.page,
            query.page_size,
            self.settings.default_page_size,
            self.settings.max_page_size,
        )?;
        let filter = UserFilter {
            is_company_member: query.is_company_member,
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        };

        let (users, total_count) = self.user_repo.list(&filter, page).await?;
        let items = users.iter().map(UserSummary::from).collect();
        Ok(Paged::new(items, total_count, page))
    }

    pub async fn get_user(&self, ctx: &UserContext, id: Uuid) -> Result<UserDetail, ApiError> {
        require_permission!(ctx, &Permission::ManageUsers);
        let user = self.find_user(id).await?;
        self.detail(&user).await
    }

    pub async fn create_user(
        &self,
        ctx: &UserContext,
        request: &UserCreateRequest,
    ) -> Result<UserDetail, ApiError> {
        require_permission!(ctx, &Permission::ManageUsers);

        let (username, email, full_name) =
            validate_profile(&request.username, &request.email, &request.full_name)?;
        let password = request
            .password
            .as_deref()
            .ok_or_else(|| ApiError::validation("Password is required"))?;
        validate_password(password)?;

        let roles = if request.is_company_member {
            parse_staff_roles(&request.roles)?
        } else {
            vec![Role::Customer]
        };

        let new_user = NewUser {
            username,
            email,
            full_name,
            password_hash: hash_password(password)?,
            is_company_member: request.is_company_member,
            is_active: request.is_active,
        };
        let user = self.user_repo.create(&new_user, &roles).await?;

        tracing::info!(
            user_id = %user.id,
            created_by = %ctx.user_id,
            is_company_member = user.is_company_member,
            "user created"
        );

        Ok(UserDetail::new(&user, roles))
    }

    pub async fn update_user(
        &self,
        ctx: &UserContext,
        id: Uuid,
        request: &UserUpdateRequest,
    ) -> Result<UserDetail, ApiError> {
        require_permission!(ctx, &Permission::ManageUsers);
        if id == ctx.user_id {
            return Err(ApiError::validation("You cannot edit your own account here"));
        }

        let existing = self.find_user(id).await?;
        let (username, email, full_name) =
            validate_profile(&request.username, &request.email, &request.full_name)?;

        let user = self
            .user_repo
            .update(
                id,
                &UserUpdate {
                    username,
                    email,
                    full_name,
                    is_company_member: request.is_company_member,
                    is_active: request.is_active,
                },
            )
            .await?;

        // Keep the role set consistent with the company-member flag.
        if existing.is_company_member != user.is_company_member {
            let roles: &[Role] = if user.is_company_member {
                &[]
            } else {
                &[Role::Customer]
            };
            self.user_repo
                .set_user_roles(id, roles, Some(ctx.user_id))
                .await?;
        }

        tracing::info!(user_id = %id, updated_by = %ctx.user_id, "user updated");
        self.detail(&user).await
    }

    pub async fn set_roles(
        &self,
        ctx: &UserContext,
        id: Uuid,
        role_names: &[String],
    ) -> Result<UserDetail, ApiError> {
        require_permission!(ctx, &Permission::ManageUsers);

        let user = self.find_user(id).await?;
        let roles = if user.is_company_member {
            parse_staff_roles(role_names)?
        } else {
            let roles = parse_roles(role_names)?;
            if roles.iter().any(|r| *r != Role::Customer) {
                return Err(ApiError::validation(
                    "Customer accounts can only hold the Customer role",
                ));
            }
            vec![Role::Customer]
        };

        self.user_repo
            .set_user_roles(id, &roles, Some(ctx.user_id))
            .await?;

        tracing::info!(
            user_id = %id,
            assigned_by = %ctx.user_id,
            roles = ?roles,
            "user roles replaced"
        );

        Ok(UserDetail::new(&user, roles))
    }

    pub async fn delete_user(&self, ctx: &UserContext, id: Uuid) -> Result<(), ApiError> {
        require_permission!(ctx, &Permission::ManageUsers);
        if id == ctx.user_id {
            return Err(ApiError::validation("You cannot delete your own account"));
        }

        self.user_repo.soft_delete(id, Utc::now()).await?;
        tracing::info!(user_id = %id, deleted_by = %ctx.user_id, "user soft-deleted");
        Ok(())
    }

    pub async fn reset_password(
        &self,
        ctx: &UserContext,
        id: Uuid,
        new_password: &str,
    ) -> Result<(), ApiError> {
        require_permission!(ctx, &Permission::ManageUsers);
        validate_password(new_password)?;

        self.find_user(id).await?;
        self.user_repo
            .update_password(id, &hash_password(new_password)?)
            .await?;

        tracing::info!(user_id = %id, reset_by = %ctx.user_id, "password reset");
        Ok(())
    }

    /// Activate a self-registered customer account.
    pub async fn confirm_user(&self, ctx: &UserContext, id: Uuid) -> Result<UserDetail, ApiError> {
        require_permission!(ctx, &Permission::ManageUsers);

        let mut user = self.find_user(id).await?;
        if user.is_company_member {
            return Err(ApiError::validation(
                "Only customer accounts require confirmation",
            ));
        }
        if user.is_active {
            return Err(ApiError::validation("Account is already active"));
        }

        self.user_repo.set_active(id, true).await?;
        user.is_active = true;

        tracing::info!(user_id = %id, confirmed_by = %ctx.user_id, "customer account confirmed");
        self.detail(&user).await
    }

    async fn find_user(&self, id: Uuid) -> Result<User, ApiError> {
        self.user_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("User {} not found", id)))
    }

    async fn detail(&self, user: &User) -> Result<UserDetail, ApiError> {
        let roles = self.user_repo.get_user_roles(user.id).await?;
        Ok(UserDetail::new(user, roles))
    }
}

fn validate_profile(
    username: &str,
    email: &str,
    full_name: &str,
) -> Result<(String, String, String), ApiError> {
    let (username, email, full_name) = (username.trim(), email.trim(), full_name.trim());
    validate_username(username)?;
    validate_email(email)?;
    validate_full_name(full_name)?;
    Ok((username.to_string(), email.to_string(), full_name.to_string()))
}

fn parse_roles(names: &[String]) -> Result<Vec<Role>, ApiError> {
    let mut roles = Vec::with_capacity(names.len());
    for name in names {
        let role = Role::from_str(name)
            .ok_or_else(|| ApiError::validation(format!("Unknown role '{}'", name)))?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    Ok(roles)
}

fn parse_staff_roles(names: &[String]) -> Result<Vec<Role>, ApiError> {
    let roles = parse_roles(names)?;
    if roles.contains(&Role::Customer) {
        return Err(ApiError::validation(
            "Company members cannot hold the Customer role",
        ));
    }
    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryDatabase;

    fn service(db: &Arc<InMemoryDatabase>) -> UserService {
        let settings = Arc::new(Settings::new_with_env_file(false).unwrap());
        UserService::new(settings, db.repositories().users)
    }

    fn staff_request(username: &str, roles: &[&str]) -> UserCreateRequest {
        UserCreateRequest {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            full_name: "Staff Member".to_string(),
            password: Some("secret1".to_string()),
            is_company_member: true,
            is_active: true,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_requires_manage_users() {
        let db = InMemoryDatabase::new();
        let users = service(&db);
        let support = db.context(&db.add_staff("sam", &[Role::Support]));

        let err = users
            .list_users(&support, &UserListQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let manager = db.context(&db.add_staff("tina", &[Role::TechnicalManager]));
        let page = users.list_users(&manager, &UserListQuery::default()).await.unwrap();
        assert_eq!(page.total_count, 2);
    }

    #[tokio::test]
    async fn test_create_staff_and_customer() {
        let db = InMemoryDatabase::new();
        let users = service(&db);
        let admin = db.context(&db.add_admin("ada"));

        let staff = users
            .create_user(&admin, &staff_request("sam", &["support", "Seo"]))
            .await
            .unwrap();
        assert_eq!(staff.roles, vec![Role::Support, Role::Seo]);

        let mut customer = staff_request("carol", &["Admin"]);
        customer.is_company_member = false;
        let customer = users.create_user(&admin, &customer).await.unwrap();
        assert_eq!(customer.roles, vec![Role::Customer]);

        let err = users
            .create_user(&admin, &staff_request("sid", &["Wizard"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let mut no_password = staff_request("pat", &[]);
        no_password.password = None;
        assert!(matches!(
            users.create_user(&admin, &no_password).await,
            Err(ApiError::Validation(_))
        ));

        let err = users
            .create_user(&admin, &staff_request("SAM", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cannot_edit_or_delete_self() {
        let db = InMemoryDatabase::new();
        let users = service(&db);
        let admin_user = db.add_admin("ada");
        let admin = db.context(&admin_user);

        let update = UserUpdateRequest {
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            full_name: "Ada".to_string(),
            is_company_member: true,
            is_active: false,
        };
        assert!(users.update_user(&admin, admin.user_id, &update).await.is_err());
        assert!(users.delete_user(&admin, admin.user_id).await.is_err());
    }

    #[tokio::test]
    async fn test_soft_deleted_user_is_not_found() {
        let db = InMemoryDatabase::new();
        let users = service(&db);
        let admin = db.context(&db.add_admin("ada"));
        let carol = db.add_customer("carol");

        users.delete_user(&admin, carol.id).await.unwrap();
        let err = users.get_user(&admin, carol.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(matches!(
            users.delete_user(&admin, carol.id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_roles() {
        let db = InMemoryDatabase::new();
        let users = service(&db);
        let admin = db.context(&db.add_admin("ada"));
        let staff = db.add_staff("sam", &[Role::Support]);
        let carol = db.add_customer("carol");

        let detail = users
            .set_roles(&admin, staff.id, &["Accountant".to_string()])
            .await
            .unwrap();
        assert_eq!(detail.roles, vec![Role::Accountant]);

        let err = users
            .set_roles(&admin, carol.id, &["Support".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = users
            .set_roles(&admin, staff.id, &["nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_confirm_user() {
        let db = InMemoryDatabase::new();
        let users = service(&db);
        let admin = db.context(&db.add_admin("ada"));
        let pending = db.add_inactive_customer("pete");
        let staff = db.add_staff("sam", &[Role::Support]);

        let confirmed = users.confirm_user(&admin, pending.id).await.unwrap();
        assert!(confirmed.user.is_active);

        assert!(matches!(
            users.confirm_user(&admin, pending.id).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            users.confirm_user(&admin, staff.id).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_password() {
        let db = InMemoryDatabase::new();
        let users = service(&db);
        let admin = db.context(&db.add_admin("ada"));
        let carol = db.add_customer("carol");

        assert!(matches!(
            users.reset_password(&admin, carol.id, "123").await,
            Err(ApiError::Validation(_))
        ));
        users.reset_password(&admin, carol.id, "new-secret").await.unwrap();

        let stored = db.user(carol.id).unwrap();
        assert!(crate::utils::crypto::verify_password("new-secret", &stored.password_hash).unwrap());
    }
}
