//! Bootstrap of administrator accounts, driven by the `auth-admin` binary.

use chrono::Utc;
use std::sync::Arc;

use super::database::CredentialStore;
use super::revocation::RevocationEngine;
use super::ServiceError;
use crate::models::{Permission, PermissionSelector, User, UserSelector};
use crate::utils::{Password, PasswordService};

pub const ADMIN_PERMISSION: &str = "admin";

/// What `delete_admin` did.
#[derive(Debug, Clone)]
pub struct AdminRemoval {
    pub user: User,
    pub permission_deleted: bool,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn CredentialStore>,
    revocation: RevocationEngine,
    passwords: PasswordService,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        revocation: RevocationEngine,
        passwords: PasswordService,
    ) -> Self {
        Self {
            store,
            revocation,
            passwords,
        }
    }

    /// Create `login` holding the `admin` permission, creating the
    /// permission first if needed. `Conflict` when the login is taken.
    pub async fn create_admin(&self, login: &str, password: Password) -> Result<User, ServiceError> {
        if login.is_empty() || password.is_empty() {
            return Err(ServiceError::BadRequest(
                "Login and password are required".to_string(),
            ));
        }

        let permission = self.ensure_admin_permission().await?;

        let hash = self.passwords.hash(&password)?;
        let user = self.store.create_user(login, hash.as_str()).await?;
        self.store.attach(user.id, permission.id).await?;

        tracing::info!(user_id = %user.id, login = %user.login, "Administrator created");
        Ok(user)
    }

    /// Strip `admin` from `login`, soft-delete it and revoke its sessions.
    /// The `admin` permission itself goes once nobody holds it.
    pub async fn delete_admin(&self, login: &str) -> Result<AdminRemoval, ServiceError> {
        let user = self
            .store
            .find_user(&UserSelector::login(login), false)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User login '{}' not found", login)))?;

        self.revocation
            .ban_all_sessions(user.id, Utc::now().timestamp_micros())
            .await?;

        let permission = self
            .store
            .find_permission(&PermissionSelector::name(ADMIN_PERMISSION))
            .await?;
        if let Some(permission) = &permission {
            self.store.detach(user.id, permission.id).await?;
        }
        self.store.soft_delete_user(user.id).await?;

        let mut permission_deleted = false;
        if let Some(permission) = permission {
            if self.store.users_holding(permission.id).await?.is_empty() {
                self.store.delete_permission(permission.id).await?;
                permission_deleted = true;
            }
        }

        tracing::info!(
            user_id = %user.id,
            permission_deleted,
            "Administrator removed"
        );
        Ok(AdminRemoval {
            user,
            permission_deleted,
        })
    }

    async fn ensure_admin_permission(&self) -> Result<Permission, ServiceError> {
        let selector = PermissionSelector::name(ADMIN_PERMISSION);
        if let Some(permission) = self.store.find_permission(&selector).await? {
            return Ok(permission);
        }

        match self
            .store
            .create_permission(ADMIN_PERMISSION, Some("Full access to permission management"))
            .await
        {
            Ok(permission) => Ok(permission),
            // Lost a race with a concurrent bootstrap.
            Err(ServiceError::Conflict(_)) => self
                .store
                .find_permission(&selector)
                .await?
                .ok_or_else(|| {
                    ServiceError::Internal(anyhow::anyhow!("Admin permission vanished"))
                }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PasswordConfig;
    use crate::services::{MockCredentialStore, MockRevocationStore, RevocationPolicy};

    fn service() -> (AdminService, Arc<MockCredentialStore>) {
        let store = Arc::new(MockCredentialStore::new());
        let revocation = RevocationEngine::new(
            Arc::new(MockRevocationStore::new()),
            RevocationPolicy::Permissive,
            900,
            86400,
        );
        let passwords = PasswordService::new(&PasswordConfig {
            iterations: 1,
            memory_kib: 1024,
        })
        .unwrap();
        (
            AdminService::new(store.clone(), revocation, passwords),
            store.clone(),
        )
    }

    #[tokio::test]
    async fn test_create_admin_grants_admin() -> Result<(), anyhow::Error> {
        let (admin, store) = service();
        let user = admin
            .create_admin("root", Password::new("secret".to_string()))
            .await?;

        let grants = store.user_permissions(user.id).await?;
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].name, ADMIN_PERMISSION);
        Ok(())
    }

    #[tokio::test]
    async fn test_second_admin_reuses_permission() -> Result<(), anyhow::Error> {
        let (admin, store) = service();
        admin
            .create_admin("root", Password::new("secret".to_string()))
            .await?;
        admin
            .create_admin("ops", Password::new("secret".to_string()))
            .await?;

        assert_eq!(store.list_permissions().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_admin_rejects_taken_login() -> Result<(), anyhow::Error> {
        let (admin, _) = service();
        admin
            .create_admin("root", Password::new("secret".to_string()))
            .await?;

        let err = admin
            .create_admin("root", Password::new("other".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_last_admin_drops_permission() -> Result<(), anyhow::Error> {
        let (admin, store) = service();
        admin
            .create_admin("root", Password::new("secret".to_string()))
            .await?;
        admin
            .create_admin("ops", Password::new("secret".to_string()))
            .await?;

        let first = admin.delete_admin("root").await?;
        assert!(!first.permission_deleted);

        let second = admin.delete_admin("ops").await?;
        assert!(second.permission_deleted);
        assert!(store.list_permissions().await?.is_empty());
        assert!(store
            .find_user(&UserSelector::login("ops"), false)
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_unknown_admin() {
        let (admin, _) = service();
        let err = admin.delete_admin("ghost").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
