//! Permission graph management and authorization.
//!
//! Every mutation touching a user's grants bans all of that user's sessions
//! before the change is committed, so no token keeps a stale snapshot.
//! Requests that fail validation or name checks ban nothing.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::database::CredentialStore;
use super::revocation::RevocationEngine;
use super::ServiceError;
use crate::models::{
    Permission, PermissionChanges, PermissionSelector, TokenClaims, User, UserPermissions,
    UserSelector,
};

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn CredentialStore>,
    revocation: RevocationEngine,
    privileged: Arc<[String]>,
}

impl PermissionService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        revocation: RevocationEngine,
        privileged: Vec<String>,
    ) -> Self {
        Self {
            store,
            revocation,
            privileged: privileged.into(),
        }
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::BadRequest(
                "Permission name is required".to_string(),
            ));
        }

        let permission = self.store.create_permission(name, description).await?;
        tracing::info!(permission_id = %permission.id, name = %permission.name, "Permission created");
        Ok(permission)
    }

    pub async fn delete(&self, selector: &PermissionSelector) -> Result<(), ServiceError> {
        let permission = self.resolve_permission(selector).await?;
        let affected = self.ban_holders(permission.id).await?;

        self.store.delete_permission(permission.id).await?;

        tracing::info!(
            permission_id = %permission.id,
            affected_users = affected,
            "Permission deleted"
        );
        Ok(())
    }

    pub async fn update(
        &self,
        selector: &PermissionSelector,
        changes: &PermissionChanges,
    ) -> Result<Permission, ServiceError> {
        if changes.is_empty() {
            return Err(ServiceError::BadRequest("Nothing to update".to_string()));
        }
        if changes.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ServiceError::BadRequest(
                "Permission name must not be empty".to_string(),
            ));
        }

        let permission = self.resolve_permission(selector).await?;
        if let Some(name) = changes.name.as_deref() {
            let taken = self
                .store
                .find_permission(&PermissionSelector::name(name))
                .await?
                .is_some_and(|other| other.id != permission.id);
            if taken {
                return Err(ServiceError::Conflict(format!(
                    "Permission '{}' already exists",
                    name
                )));
            }
        }
        let affected = self.ban_holders(permission.id).await?;

        let updated = self.store.update_permission(permission.id, changes).await?;

        tracing::info!(
            permission_id = %updated.id,
            affected_users = affected,
            "Permission updated"
        );
        Ok(updated)
    }

    pub async fn get_all(&self) -> Result<Vec<Permission>, ServiceError> {
        self.store.list_permissions().await
    }

    pub async fn assign(
        &self,
        selector: &PermissionSelector,
        user_selector: &UserSelector,
    ) -> Result<UserPermissions, ServiceError> {
        let permission = self.resolve_permission(selector).await?;
        let user = self.resolve_user(user_selector).await?;

        if self.holds(&user, permission.id).await? {
            return Err(ServiceError::Conflict(format!(
                "User {} already has permission {}",
                user_selector, selector
            )));
        }

        self.revocation
            .ban_all_sessions(user.id, Utc::now().timestamp_micros())
            .await?;
        if !self.store.attach(user.id, permission.id).await? {
            return Err(ServiceError::Conflict(format!(
                "User {} already has permission {}",
                user_selector, selector
            )));
        }

        tracing::info!(user_id = %user.id, permission_id = %permission.id, "Permission assigned");
        self.user_with_permissions(&user).await
    }

    pub async fn take_away(
        &self,
        selector: &PermissionSelector,
        user_selector: &UserSelector,
    ) -> Result<UserPermissions, ServiceError> {
        let permission = self.resolve_permission(selector).await?;
        let user = self.resolve_user(user_selector).await?;

        if !self.holds(&user, permission.id).await? {
            return Err(ServiceError::Conflict(format!(
                "User {} does not have permission {}",
                user_selector, selector
            )));
        }

        self.revocation
            .ban_all_sessions(user.id, Utc::now().timestamp_micros())
            .await?;
        if !self.store.detach(user.id, permission.id).await? {
            return Err(ServiceError::Conflict(format!(
                "User {} does not have permission {}",
                user_selector, selector
            )));
        }

        tracing::info!(user_id = %user.id, permission_id = %permission.id, "Permission taken away");
        self.user_with_permissions(&user).await
    }

    pub async fn get_user_permissions(
        &self,
        user_selector: &UserSelector,
    ) -> Result<UserPermissions, ServiceError> {
        let user = self.resolve_user(user_selector).await?;
        self.user_with_permissions(&user).await
    }

    /// Require `claims` to carry every permission named in `required`.
    ///
    /// Names resolve against the live store on every call; names that no
    /// longer exist are not required. A token with no permissions never
    /// passes.
    pub async fn check(&self, required: &[String], claims: &TokenClaims) -> Result<(), ServiceError> {
        if claims.permissions.is_empty() {
            return Err(ServiceError::Forbidden("Not enough permissions".to_string()));
        }

        let required = self.store.find_permissions_by_names(required).await?;
        if let Some(missing) = required
            .iter()
            .find(|p| !claims.permissions.contains(&p.id))
        {
            tracing::info!(
                user_id = %claims.sub,
                permission_id = %missing.id,
                "Authorization denied: missing permission"
            );
            return Err(ServiceError::Forbidden("Not enough permissions".to_string()));
        }

        Ok(())
    }

    /// `check` against the configured privileged names.
    pub async fn check_privileged(&self, claims: &TokenClaims) -> Result<(), ServiceError> {
        self.check(&self.privileged, claims).await
    }

    async fn resolve_permission(
        &self,
        selector: &PermissionSelector,
    ) -> Result<Permission, ServiceError> {
        self.store
            .find_permission(selector)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Permission {} not found", selector)))
    }

    async fn resolve_user(&self, selector: &UserSelector) -> Result<User, ServiceError> {
        self.store
            .find_user(selector, false)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", selector)))
    }

    async fn holds(&self, user: &User, permission_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self
            .store
            .user_permissions(user.id)
            .await?
            .iter()
            .any(|p| p.id == permission_id))
    }

    /// Ban every session of every active holder. Returns how many users.
    async fn ban_holders(&self, permission_id: Uuid) -> Result<usize, ServiceError> {
        let holders: Vec<Uuid> = self
            .store
            .users_holding(permission_id)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();

        self.revocation
            .ban_all_sessions_batch(&holders, Utc::now().timestamp_micros())
            .await?;
        Ok(holders.len())
    }

    async fn user_with_permissions(&self, user: &User) -> Result<UserPermissions, ServiceError> {
        let permissions = self.store.user_permissions(user.id).await?;
        Ok(UserPermissions::new(user, permissions))
    }
}
