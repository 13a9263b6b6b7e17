//! Session lifecycle: register, login, refresh, logout and account removal.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::database::CredentialStore;
use super::jwt::{JwtService, TokenError};
use super::metrics;
use super::revocation::RevocationEngine;
use super::ServiceError;
use crate::models::{
    PermissionSnapshot, TokenClaims, TokenPair, TokenType, User, UserSelector,
};
use crate::utils::{Password, PasswordHashString, PasswordService};

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn CredentialStore>,
    revocation: RevocationEngine,
    jwt: JwtService,
    passwords: PasswordService,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        revocation: RevocationEngine,
        jwt: JwtService,
        passwords: PasswordService,
    ) -> Self {
        Self {
            store,
            revocation,
            jwt,
            passwords,
        }
    }

    pub async fn register(&self, login: &str, password: Password) -> Result<User, ServiceError> {
        if login.is_empty() || password.is_empty() {
            return Err(ServiceError::BadRequest(
                "Login and password are required".to_string(),
            ));
        }

        let hash = self.passwords.hash(&password)?;
        let user = self.store.create_user(login, hash.as_str()).await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    pub async fn login(&self, login: &str, password: Password) -> Result<TokenPair, ServiceError> {
        let user = match self
            .store
            .find_user(&UserSelector::login(login), false)
            .await?
        {
            Some(user) => user,
            None => {
                metrics::record_login("unknown_user");
                return Err(ServiceError::invalid_credentials());
            }
        };

        let stored = PasswordHashString::new(user.password.clone());
        if !self.passwords.verify(&password, &stored) {
            metrics::record_login("bad_password");
            tracing::info!(user_id = %user.id, "Login rejected: password mismatch");
            return Err(ServiceError::invalid_credentials());
        }

        let snapshot: PermissionSnapshot = self
            .store
            .user_permissions(user.id)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let pair = self.issue_pair(user.id, snapshot)?;

        metrics::record_login("success");
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Decode a token, check its type and make sure it is not revoked.
    pub async fn authenticate(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<TokenClaims, ServiceError> {
        let claims = self.jwt.decode(token).map_err(|e| {
            let reason = match &e {
                TokenError::Expired => "expired",
                TokenError::InvalidSignature => "bad_signature",
                TokenError::Malformed(_) | TokenError::Encoding(_) => "malformed",
            };
            metrics::record_rejection(reason);
            tracing::debug!(error = %e, "Token rejected");
            ServiceError::invalid_token()
        })?;

        if claims.token_type != expected {
            metrics::record_rejection("wrong_type");
            return Err(ServiceError::Unauthenticated(format!(
                "Expected {} token",
                expected
            )));
        }

        if self.revocation.is_banned(&claims, token).await? {
            metrics::record_rejection("banned");
            tracing::info!(user_id = %claims.sub, jti = %claims.jti, "Revoked token presented");
            return Err(ServiceError::Banned {
                token_type: claims.token_type,
            });
        }

        Ok(claims)
    }

    /// Verified claims of an access token.
    pub async fn payload(&self, access_token: &str) -> Result<TokenClaims, ServiceError> {
        self.authenticate(access_token, TokenType::Access).await
    }

    /// Ban both tokens of a pair for the rest of their lifetimes.
    pub async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<(), ServiceError> {
        let access = self.authenticate(access_token, TokenType::Access).await?;
        let refresh = self.authenticate(refresh_token, TokenType::Refresh).await?;

        if access.sub != refresh.sub {
            return Err(ServiceError::Unauthenticated(
                "Tokens belong to different users".to_string(),
            ));
        }

        let now = Utc::now().timestamp();
        self.revocation
            .ban_token(&access, access_token, access.remaining_lifetime(now))
            .await?;
        self.revocation
            .ban_token(&refresh, refresh_token, refresh.remaining_lifetime(now))
            .await?;

        tracing::info!(user_id = %access.sub, "User logged out");
        Ok(())
    }

    /// Revoke every session of the caller on every device.
    pub async fn logout_all(&self, access_token: &str) -> Result<(), ServiceError> {
        let claims = self.authenticate(access_token, TokenType::Access).await?;

        self.revocation
            .ban_all_sessions(claims.sub, Utc::now().timestamp_micros())
            .await?;

        tracing::info!(user_id = %claims.sub, "User logged out of all devices");
        Ok(())
    }

    /// New access token carrying the refresh token's permission snapshot.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(String, TokenClaims), ServiceError> {
        let claims = self.authenticate(refresh_token, TokenType::Refresh).await?;

        let (token, access) = self
            .jwt
            .issue_default(claims.sub, TokenType::Access, claims.permissions)
            .map_err(|e| ServiceError::Internal(e.into()))?;

        tracing::info!(user_id = %access.sub, jti = %access.jti, "Access token refreshed");
        Ok((token, access))
    }

    /// Outstanding sessions stay valid after a password change.
    pub async fn change_password(
        &self,
        access_token: &str,
        old_password: Password,
        new_password: Password,
    ) -> Result<(), ServiceError> {
        let claims = self.authenticate(access_token, TokenType::Access).await?;

        if new_password.is_empty() {
            return Err(ServiceError::BadRequest("New password is required".to_string()));
        }

        let user = self.active_user(claims.sub).await?;
        let stored = PasswordHashString::new(user.password);
        if !self.passwords.verify(&old_password, &stored) {
            return Err(ServiceError::Unauthenticated(
                "Invalid current password".to_string(),
            ));
        }

        let hash = self.passwords.hash(&new_password)?;
        self.store.update_password(user.id, hash.as_str()).await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    /// Soft-delete the caller and revoke all of its sessions.
    pub async fn delete_account(&self, access_token: &str) -> Result<(), ServiceError> {
        let claims = self.authenticate(access_token, TokenType::Access).await?;
        let user = self.active_user(claims.sub).await?;

        self.revocation
            .ban_all_sessions(user.id, Utc::now().timestamp_micros())
            .await?;
        self.store.soft_delete_user(user.id).await?;

        tracing::info!(user_id = %user.id, "Account deleted");
        Ok(())
    }

    async fn active_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.store
            .find_user(&UserSelector::Id(user_id), false)
            .await?
            .ok_or_else(|| ServiceError::Unauthenticated("User no longer exists".to_string()))
    }

    fn issue_pair(
        &self,
        user_id: Uuid,
        snapshot: PermissionSnapshot,
    ) -> Result<TokenPair, ServiceError> {
        let (access_token, access) = self
            .jwt
            .issue_default(user_id, TokenType::Access, snapshot.clone())
            .map_err(|e| ServiceError::Internal(e.into()))?;
        let (refresh_token, refresh) = self
            .jwt
            .issue_default(user_id, TokenType::Refresh, snapshot)
            .map_err(|e| ServiceError::Internal(e.into()))?;

        Ok(TokenPair {
            access_token,
            access_expires_at: access.exp,
            refresh_token,
            refresh_expires_at: refresh.exp,
        })
    }
}
