//! Credential store: users, permissions and the grants between them.
//!
//! Users are soft-deleted. A login owns exactly one row for its whole life;
//! registering a deleted login brings that row back with a new password.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::ServiceError;
use crate::models::{Permission, PermissionChanges, PermissionSelector, User, UserSelector};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user(
        &self,
        selector: &UserSelector,
        include_deleted: bool,
    ) -> Result<Option<User>, ServiceError>;

    /// Insert a user, or revive the soft-deleted row holding `login`.
    /// `Conflict` when an active user already has the login.
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User, ServiceError>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str)
        -> Result<(), ServiceError>;

    /// Flag the user deleted and drop every grant it holds.
    async fn soft_delete_user(&self, user_id: Uuid) -> Result<(), ServiceError>;

    async fn find_permission(
        &self,
        selector: &PermissionSelector,
    ) -> Result<Option<Permission>, ServiceError>;

    async fn find_permissions_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<Permission>, ServiceError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, ServiceError>;

    /// `Conflict` when the name is taken.
    async fn create_permission(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError>;

    /// `Conflict` when a rename collides with another permission. Absent
    /// fields keep their stored value, so a description is replaced but
    /// never cleared.
    async fn update_permission(
        &self,
        permission_id: Uuid,
        changes: &PermissionChanges,
    ) -> Result<Permission, ServiceError>;

    /// Remove the permission and every grant of it.
    async fn delete_permission(&self, permission_id: Uuid) -> Result<(), ServiceError>;

    /// Returns false when the grant already existed.
    async fn attach(&self, user_id: Uuid, permission_id: Uuid) -> Result<bool, ServiceError>;

    /// Returns false when there was no grant to remove.
    async fn detach(&self, user_id: Uuid, permission_id: Uuid) -> Result<bool, ServiceError>;

    /// Active users holding the permission.
    async fn users_holding(&self, permission_id: Uuid) -> Result<Vec<User>, ServiceError>;

    async fn user_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

/// Map unique violations to `Conflict`, everything else to `Database`.
fn conflict_or_db(err: sqlx::Error, conflict: impl FnOnce() -> String) -> ServiceError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ServiceError::Conflict(conflict()),
        _ => ServiceError::Database(err),
    }
}

/// PostgreSQL credential store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn find_user(
        &self,
        selector: &UserSelector,
        include_deleted: bool,
    ) -> Result<Option<User>, ServiceError> {
        let query = match selector {
            UserSelector::Id(id) => {
                sqlx::query_as::<_, User>(
                    "SELECT * FROM users WHERE id = $1 AND (is_deleted = FALSE OR $2)",
                )
                .bind(*id)
            }
            UserSelector::Login(login) => {
                sqlx::query_as::<_, User>(
                    "SELECT * FROM users WHERE login = $1 AND (is_deleted = FALSE OR $2)",
                )
                .bind(login.clone())
            }
        };

        Ok(query
            .bind(include_deleted)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User, ServiceError> {
        let now = Utc::now();
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, login, password, is_deleted, created_at, modified_at)
            VALUES ($1, $2, $3, FALSE, $4, $4)
            ON CONFLICT (login) DO UPDATE
                SET password = EXCLUDED.password,
                    is_deleted = FALSE,
                    modified_at = EXCLUDED.modified_at
                WHERE users.is_deleted
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(login)
        .bind(password_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or_else(|| ServiceError::Conflict(format!("User '{}' already exists", login)))
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE users SET password = $2, modified_at = $3 WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(user_id)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn soft_delete_user(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "UPDATE users SET is_deleted = TRUE, modified_at = $2 WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_permission(
        &self,
        selector: &PermissionSelector,
    ) -> Result<Option<Permission>, ServiceError> {
        let query = match selector {
            PermissionSelector::Id(id) => {
                sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = $1").bind(*id)
            }
            PermissionSelector::Name(name) => {
                sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE name = $1")
                    .bind(name.clone())
            }
        };

        Ok(query.fetch_optional(&self.pool).await?)
    }

    async fn find_permissions_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<Permission>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE name = ANY($1)")
                .bind(names)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn create_permission(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError> {
        let permission = Permission::new(name.to_string(), description.map(str::to_string));

        sqlx::query(
            r#"
            INSERT INTO permissions (id, name, description, created_at, modified_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(permission.id)
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(permission.created_at)
        .bind(permission.modified_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, || format!("Permission '{}' already exists", name)))?;

        Ok(permission)
    }

    async fn update_permission(
        &self,
        permission_id: Uuid,
        changes: &PermissionChanges,
    ) -> Result<Permission, ServiceError> {
        let permission = sqlx::query_as::<_, Permission>(
            r#"
            UPDATE permissions
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                modified_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(permission_id)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            conflict_or_db(e, || {
                format!(
                    "Permission '{}' already exists",
                    changes.name.as_deref().unwrap_or_default()
                )
            })
        })?;

        permission.ok_or_else(|| ServiceError::NotFound("Permission not found".to_string()))
    }

    async fn delete_permission(&self, permission_id: Uuid) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_permissions WHERE permission_id = $1")
            .bind(permission_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(permission_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Permission not found".to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn attach(&self, user_id: Uuid, permission_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_permissions (user_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn detach(&self, user_id: Uuid, permission_id: Uuid) -> Result<bool, ServiceError> {
        let result =
            sqlx::query("DELETE FROM user_permissions WHERE user_id = $1 AND permission_id = $2")
                .bind(user_id)
                .bind(permission_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn users_holding(&self, permission_id: Uuid) -> Result<Vec<User>, ServiceError> {
        Ok(sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            JOIN user_permissions up ON up.user_id = u.id
            WHERE up.permission_id = $1 AND u.is_deleted = FALSE
            "#,
        )
        .bind(permission_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn user_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>, ServiceError> {
        Ok(sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.* FROM permissions p
            JOIN user_permissions up ON up.permission_id = p.id
            WHERE up.user_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Health check - ping the database.
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::Database(e)
            })?;
        Ok(())
    }
}

#[derive(Default)]
struct MockState {
    users: HashMap<Uuid, User>,
    permissions: HashMap<Uuid, Permission>,
    grants: HashSet<(Uuid, Uuid)>,
}

/// In-memory credential store with the same semantics as [`Database`].
#[derive(Default)]
pub struct MockCredentialStore {
    state: Mutex<MockState>,
}

impl MockCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>, ServiceError> {
        self.state
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Mock store mutex poisoned: {}", e)))
    }

    /// Number of rows for a login, deleted or not.
    pub fn rows_for_login(&self, login: &str) -> usize {
        self.state
            .lock()
            .map(|state| state.users.values().filter(|u| u.login == login).count())
            .unwrap_or(0)
    }
}

impl MockState {
    fn user_by(&self, selector: &UserSelector) -> Option<&User> {
        match selector {
            UserSelector::Id(id) => self.users.get(id),
            UserSelector::Login(login) => self.users.values().find(|u| &u.login == login),
        }
    }

    fn permission_by(&self, selector: &PermissionSelector) -> Option<&Permission> {
        match selector {
            PermissionSelector::Id(id) => self.permissions.get(id),
            PermissionSelector::Name(name) => self.permissions.values().find(|p| &p.name == name),
        }
    }

    fn name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.permissions
            .values()
            .any(|p| p.name == name && Some(p.id) != except)
    }
}

#[async_trait]
impl CredentialStore for MockCredentialStore {
    async fn find_user(
        &self,
        selector: &UserSelector,
        include_deleted: bool,
    ) -> Result<Option<User>, ServiceError> {
        let state = self.lock()?;
        Ok(state
            .user_by(selector)
            .filter(|u| include_deleted || !u.is_deleted)
            .cloned())
    }

    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User, ServiceError> {
        let mut state = self.lock()?;

        let existing = state.users.values().find(|u| u.login == login).map(|u| u.id);
        match existing {
            Some(id) => {
                let user = state
                    .users
                    .get_mut(&id)
                    .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("user vanished")))?;
                if !user.is_deleted {
                    return Err(ServiceError::Conflict(format!(
                        "User '{}' already exists",
                        login
                    )));
                }
                user.password = password_hash.to_string();
                user.is_deleted = false;
                user.modified_at = Utc::now();
                Ok(user.clone())
            }
            None => {
                let user = User::new(login.to_string(), password_hash.to_string());
                state.users.insert(user.id, user.clone());
                Ok(user)
            }
        }
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        match state.users.get_mut(&user_id) {
            Some(user) if !user.is_deleted => {
                user.password = password_hash.to_string();
                user.modified_at = Utc::now();
                Ok(())
            }
            _ => Err(ServiceError::NotFound("User not found".to_string())),
        }
    }

    async fn soft_delete_user(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        match state.users.get_mut(&user_id) {
            Some(user) if !user.is_deleted => {
                user.is_deleted = true;
                user.modified_at = Utc::now();
            }
            _ => return Err(ServiceError::NotFound("User not found".to_string())),
        }
        state.grants.retain(|(user, _)| *user != user_id);
        Ok(())
    }

    async fn find_permission(
        &self,
        selector: &PermissionSelector,
    ) -> Result<Option<Permission>, ServiceError> {
        Ok(self.lock()?.permission_by(selector).cloned())
    }

    async fn find_permissions_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<Permission>, ServiceError> {
        let state = self.lock()?;
        Ok(state
            .permissions
            .values()
            .filter(|p| names.contains(&p.name))
            .cloned()
            .collect())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, ServiceError> {
        let state = self.lock()?;
        let mut permissions: Vec<_> = state.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn create_permission(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError> {
        let mut state = self.lock()?;
        if state.name_taken(name, None) {
            return Err(ServiceError::Conflict(format!(
                "Permission '{}' already exists",
                name
            )));
        }

        let permission = Permission::new(name.to_string(), description.map(str::to_string));
        state.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn update_permission(
        &self,
        permission_id: Uuid,
        changes: &PermissionChanges,
    ) -> Result<Permission, ServiceError> {
        let mut state = self.lock()?;
        if let Some(name) = &changes.name {
            if state.name_taken(name, Some(permission_id)) {
                return Err(ServiceError::Conflict(format!(
                    "Permission '{}' already exists",
                    name
                )));
            }
        }

        let permission = state
            .permissions
            .get_mut(&permission_id)
            .ok_or_else(|| ServiceError::NotFound("Permission not found".to_string()))?;
        changes.apply(permission);
        Ok(permission.clone())
    }

    async fn delete_permission(&self, permission_id: Uuid) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        if state.permissions.remove(&permission_id).is_none() {
            return Err(ServiceError::NotFound("Permission not found".to_string()));
        }
        state.grants.retain(|(_, permission)| *permission != permission_id);
        Ok(())
    }

    async fn attach(&self, user_id: Uuid, permission_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.lock()?.grants.insert((user_id, permission_id)))
    }

    async fn detach(&self, user_id: Uuid, permission_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.lock()?.grants.remove(&(user_id, permission_id)))
    }

    async fn users_holding(&self, permission_id: Uuid) -> Result<Vec<User>, ServiceError> {
        let state = self.lock()?;
        Ok(state
            .grants
            .iter()
            .filter(|(_, permission)| *permission == permission_id)
            .filter_map(|(user, _)| state.users.get(user))
            .filter(|u| !u.is_deleted)
            .cloned()
            .collect())
    }

    async fn user_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>, ServiceError> {
        let state = self.lock()?;
        let mut permissions: Vec<_> = state
            .grants
            .iter()
            .filter(|(user, _)| *user == user_id)
            .filter_map(|(_, permission)| state.permissions.get(permission))
            .cloned()
            .collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
