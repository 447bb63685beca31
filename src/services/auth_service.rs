use crate::auth::context::UserContext;
use crate::auth::rbac::Role;
use crate::auth::session::UserSession;
use crate::config::Settings;
use crate::error::ApiError;
use crate::models::{NewUser, RegisterRequest, UserDetail};
use crate::repositories::user_repo::UserRepository;
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::validation::{
    validate_email, validate_full_name, validate_password, validate_username,
};
use std::sync::Arc;
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "Invalid username or password";
const ACCOUNT_UNAVAILABLE: &str = "Account is inactive or deleted";

pub struct AuthService {
    settings: Arc<Settings>,
    user_repo: Arc<dyn UserRepository + Send + Sync>,
}

impl AuthService {
    pub fn new(settings: Arc<Settings>, user_repo: Arc<dyn UserRepository + Send + Sync>) -> Self {
        Self {
            settings,
            user_repo,
        }
    }

    pub async fn login_local(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserSession, ApiError> {
        let user = match self.user_repo.find_by_username(username.trim()).await? {
            Some(u) => u,
            None => return Err(ApiError::Authentication(INVALID_CREDENTIALS.to_string())),
        };

        if !verify_password(password, &user.password_hash)? {
            return Err(ApiError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        if !user.is_usable() {
            tracing::info!(user_id = %user.id, "login refused for inactive account");
            return Err(ApiError::Authentication(ACCOUNT_UNAVAILABLE.to_string()));
        }

        // Update last login
        self.user_repo.update_last_login(user.id).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "user logged in");

        Ok(UserSession::new(
            user.id,
            user.username,
            self.settings.session_expiry_seconds,
        ))
    }

    /// Self-registration. The account is created inactive with the
    /// `Customer` role and waits for confirmation by a user manager.
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserDetail, ApiError> {
        let username = request.username.trim();
        let email = request.email.trim();
        let full_name = request.full_name.trim();

        validate_username(username)?;
        validate_email(email)?;
        validate_full_name(full_name)?;
        validate_password(&request.password)?;
        if request.password != request.confirm_password {
            return Err(ApiError::Validation(
                "Password and confirmation do not match".to_string(),
            ));
        }

        let new_user = NewUser {
            username: username.to_string(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            password_hash: hash_password(&request.password)?,
            is_company_member: false,
            is_active: false,
        };
        let user = self.user_repo.create(&new_user, &[Role::Customer]).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "customer registered, awaiting confirmation");

        Ok(UserDetail::new(&user, vec![Role::Customer]))
    }

    /// Build the request context for a session's user. Missing, inactive
    /// and soft-deleted users resolve to `None`.
    pub async fn resolve_context(&self, user_id: Uuid) -> Result<Option<UserContext>, ApiError> {
        let user = match self.user_repo.find_by_id(user_id).await? {
            Some(user) if user.is_usable() => user,
            _ => return Ok(None),
        };
        let roles = self.user_repo.get_user_roles(user.id).await?;
        Ok(Some(UserContext::new_user(&user, roles)))
    }

    pub async fn account_status(&self, ctx: &UserContext) -> Result<UserDetail, ApiError> {
        let user = self
            .user_repo
            .find_by_id(ctx.user_id)
            .await?
            .ok_or_else(|| ApiError::Authentication(ACCOUNT_UNAVAILABLE.to_string()))?;
        Ok(UserDetail::new(&user, ctx.roles.clone()))
    }

    /// Create the configured initial administrator if the username is free.
    pub async fn ensure_bootstrap_admin(&self) -> Result<(), ApiError> {
        let Some((username, email, password)) = self.settings.bootstrap_admin() else {
            return Ok(());
        };

        if self.user_repo.find_by_username(username).await?.is_some() {
            tracing::debug!(username = %username, "bootstrap admin already present");
            return Ok(());
        }

        validate_username(username)?;
        validate_email(email)?;
        validate_password(password)?;

        let new_user = NewUser {
            username: username.to_string(),
            email: email.to_string(),
            full_name: "Administrator".to_string(),
            password_hash: hash_password(password)?,
            is_company_member: true,
            is_active: true,
        };
        let user = self.user_repo.create(&new_user, &[Role::Admin]).await?;
        tracing::info!(user_id = %user.id, username = %username, "bootstrap administrator created");
        Ok(())
    }
}
