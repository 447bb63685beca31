use crate::auth::rbac::Role;
use crate::database::DatabasePool;
use crate::error::ApiError;
use crate::models::{NewUser, PageRequest, User, UserFilter, UserUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, full_name, password_hash, is_company_member, \
     is_active, created_at, updated_at, last_login_at, deleted_at";

const DUPLICATE_USER: &str = "username or email is already in use";

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Non-deleted user by id (active or not).
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError>;
    /// Non-deleted user by username, case-insensitive.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApiError>;
    /// Users by id for display, soft-deleted rows included.
    async fn find_for_display(&self, ids: &[Uuid]) -> Result<Vec<User>, ApiError>;
    async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<User>, i64), ApiError>;

    /// Insert the user and its roles atomically.
    async fn create(&self, user: &NewUser, roles: &[Role]) -> Result<User, ApiError>;
    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<User, ApiError>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), ApiError>;
    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<(), ApiError>;
    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), ApiError>;
    async fn update_last_login(&self, id: Uuid) -> Result<(), ApiError>;

    async fn get_user_roles(&self, id: Uuid) -> Result<Vec<Role>, ApiError>;
    /// Replace the user's role set.
    async fn set_user_roles(
        &self,
        id: Uuid,
        roles: &[Role],
        assigned_by: Option<Uuid>,
    ) -> Result<(), ApiError>;
}

pub struct SqlxUserRepository {
    pool: DatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        let sql = format!(
            "SELECT {} FROM users WHERE LOWER(username) = LOWER($1) AND deleted_at IS NULL",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_for_display(&self, ids: &[Uuid]) -> Result<Vec<User>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {} FROM users WHERE id = ANY($1)", USER_COLUMNS);
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<(Vec<User>, i64), ApiError> {
        let search_pattern = super::contains_pattern(filter.search.as_deref());

        let where_sql = "WHERE deleted_at IS NULL \
             AND ($1::BOOLEAN IS NULL OR is_company_member = $1) \
             AND ($2::TEXT IS NULL OR username ILIKE $2 OR email ILIKE $2 OR full_name ILIKE $2)";

        let total_count =
            sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM users {}", where_sql))
                .bind(filter.is_company_member)
                .bind(&search_pattern)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            "SELECT {} FROM users {} ORDER BY created_at DESC LIMIT $3 OFFSET $4",
            USER_COLUMNS, where_sql
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(filter.is_company_member)
            .bind(&search_pattern)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((users, total_count))
    }

    async fn create(&self, user: &NewUser, roles: &[Role]) -> Result<User, ApiError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let sql = format!(
            "INSERT INTO users (id, username, email, full_name, password_hash, is_company_member, \
             is_active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
             RETURNING {}",
            USER_COLUMNS
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(&user.password_hash)
            .bind(user.is_company_member)
            .bind(user.is_active)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| ApiError::from_unique_violation(e, DUPLICATE_USER))?;

        for role in roles {
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(created.id)
                .bind(role.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<User, ApiError> {
        let sql = format!(
            "UPDATE users SET username = $2, email = $3, full_name = $4, is_company_member = $5, \
             is_active = $6, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&update.username)
            .bind(&update.email)
            .bind(&update.full_name)
            .bind(update.is_company_member)
            .bind(update.is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ApiError::from_unique_violation(e, DUPLICATE_USER))?;

        user.ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), ApiError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = $2, is_active = FALSE, updated_at = $2 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_user_roles(&self, id: Uuid) -> Result<Vec<Role>, ApiError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let roles = names
            .iter()
            .filter_map(|name| {
                let role = Role::from_str(name);
                if role.is_none() {
                    tracing::warn!(user_id = %id, role = %name, "ignoring unknown stored role");
                }
                role
            })
            .collect();

        Ok(roles)
    }

    async fn set_user_roles(
        &self,
        id: Uuid,
        roles: &[Role],
        assigned_by: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for role in roles {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role, assigned_by) VALUES ($1, $2, $3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(role.as_str())
            .bind(assigned_by)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
