//! Ban bookkeeping for issued tokens.
//!
//! Two marker shapes live in the revocation store:
//!
//! * individual, `<type>_banned:<user>:<jti>`, holding the banned token string
//!   and expiring together with that token;
//! * global, `<type>_banned:all:<user>`, holding a cutoff (Unix microseconds).
//!   Every token of that type for the user issued at or before the cutoff is
//!   banned. It lives as long as the configured lifetime of the type.

use std::sync::Arc;
use uuid::Uuid;

use super::metrics;
use super::redis::{RevocationKey, RevocationStore};
use super::ServiceError;
use crate::models::{TokenClaims, TokenType};

/// How missing markers are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationPolicy {
    /// No marker means not banned.
    #[default]
    Permissive,
    /// A token needs both markers present and non-matching to pass.
    /// Every token without bookkeeping is rejected; meant as a lockdown switch.
    FailClosed,
}

#[derive(Clone)]
pub struct RevocationEngine {
    store: Arc<dyn RevocationStore>,
    policy: RevocationPolicy,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl RevocationEngine {
    pub fn new(
        store: Arc<dyn RevocationStore>,
        policy: RevocationPolicy,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        Self {
            store,
            policy,
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    pub fn policy(&self) -> RevocationPolicy {
        self.policy
    }

    /// Lifetime a global marker must cover for `token_type`.
    pub fn max_lifetime(&self, token_type: TokenType) -> i64 {
        match token_type {
            TokenType::Access => self.access_ttl_seconds,
            TokenType::Refresh => self.refresh_ttl_seconds,
        }
    }

    /// Whether an already decoded token has been revoked.
    pub async fn is_banned(&self, claims: &TokenClaims, token: &str) -> Result<bool, ServiceError> {
        let individual = self
            .store
            .get(&RevocationKey::individual(claims.token_type, claims.sub, claims.jti))
            .await?;

        match individual {
            Some(stored) if stored == token => return Ok(true),
            None if self.policy == RevocationPolicy::FailClosed => return Ok(true),
            _ => {}
        }

        let global = self
            .store
            .get(&RevocationKey::global(claims.token_type, claims.sub))
            .await?;

        match global {
            Some(cutoff) => match cutoff.parse::<i64>() {
                Ok(cutoff) => Ok(cutoff >= claims.iat_us),
                Err(_) => {
                    tracing::warn!(
                        user_id = %claims.sub,
                        token_type = %claims.token_type,
                        "Unreadable global ban marker, treating token as banned"
                    );
                    Ok(true)
                }
            },
            None => Ok(self.policy == RevocationPolicy::FailClosed),
        }
    }

    /// Ban a single token for the rest of its lifetime.
    pub async fn ban_token(
        &self,
        claims: &TokenClaims,
        token: &str,
        ttl_seconds: i64,
    ) -> Result<(), ServiceError> {
        if ttl_seconds <= 0 {
            tracing::debug!(jti = %claims.jti, "Token already expired, no marker written");
            return Ok(());
        }

        self.store
            .set(
                &RevocationKey::individual(claims.token_type, claims.sub, claims.jti),
                token,
                ttl_seconds,
            )
            .await?;

        metrics::record_markers("individual", claims.token_type.as_str(), 1);
        tracing::info!(
            user_id = %claims.sub,
            jti = %claims.jti,
            token_type = %claims.token_type,
            "Token banned"
        );
        Ok(())
    }

    /// Ban every token of `token_type` held by `user_id` issued up to `cutoff_us`.
    pub async fn ban_all(
        &self,
        token_type: TokenType,
        user_id: Uuid,
        cutoff_us: i64,
    ) -> Result<(), ServiceError> {
        self.store
            .set(
                &RevocationKey::global(token_type, user_id),
                &cutoff_us.to_string(),
                self.max_lifetime(token_type),
            )
            .await?;

        metrics::record_markers("global", token_type.as_str(), 1);
        Ok(())
    }

    /// Batched `ban_all` for many users in one round trip.
    pub async fn ban_all_batch(
        &self,
        token_type: TokenType,
        user_ids: &[Uuid],
        cutoff_us: i64,
    ) -> Result<(), ServiceError> {
        if user_ids.is_empty() {
            return Ok(());
        }

        let cutoff = cutoff_us.to_string();
        let entries: Vec<_> = user_ids
            .iter()
            .map(|user_id| (RevocationKey::global(token_type, *user_id), cutoff.clone()))
            .collect();

        self.store
            .pipeline_set(&entries, self.max_lifetime(token_type))
            .await?;

        metrics::record_markers("global", token_type.as_str(), entries.len());
        Ok(())
    }

    /// Log a user out of every device: both token types, cutoff `cutoff_us`.
    pub async fn ban_all_sessions(&self, user_id: Uuid, cutoff_us: i64) -> Result<(), ServiceError> {
        self.ban_all(TokenType::Access, user_id, cutoff_us).await?;
        self.ban_all(TokenType::Refresh, user_id, cutoff_us).await?;
        tracing::info!(user_id = %user_id, "All sessions banned");
        Ok(())
    }

    /// `ban_all_sessions` for many users.
    pub async fn ban_all_sessions_batch(
        &self,
        user_ids: &[Uuid],
        cutoff_us: i64,
    ) -> Result<(), ServiceError> {
        self.ban_all_batch(TokenType::Access, user_ids, cutoff_us)
            .await?;
        self.ban_all_batch(TokenType::Refresh, user_ids, cutoff_us)
            .await?;
        if !user_ids.is_empty() {
            tracing::info!(users = user_ids.len(), "Sessions banned for affected users");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PermissionSnapshot;
    use crate::services::redis::MockRevocationStore;
    use chrono::Utc;

    fn claims(token_type: TokenType, iat_us: i64) -> TokenClaims {
        TokenClaims {
            sub: Uuid::new_v4(),
            iat: iat_us / 1_000_000,
            iat_us,
            jti: Uuid::new_v4(),
            exp: iat_us / 1_000_000 + 900,
            token_type,
            permissions: PermissionSnapshot::default(),
        }
    }

    fn engine(policy: RevocationPolicy) -> (Arc<MockRevocationStore>, RevocationEngine) {
        let store = Arc::new(MockRevocationStore::new());
        let engine = RevocationEngine::new(store.clone(), policy, 900, 3600);
        (store, engine)
    }

    #[tokio::test]
    async fn test_fresh_token_is_not_banned_by_default() -> Result<(), anyhow::Error> {
        let (_, engine) = engine(RevocationPolicy::default());
        let claims = claims(TokenType::Access, Utc::now().timestamp_micros());

        assert_eq!(engine.policy(), RevocationPolicy::Permissive);
        assert!(!engine.is_banned(&claims, "token").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_fail_closed_rejects_token_without_markers() -> Result<(), anyhow::Error> {
        let (_, engine) = engine(RevocationPolicy::FailClosed);
        let claims = claims(TokenType::Access, Utc::now().timestamp_micros());

        assert!(engine.is_banned(&claims, "token").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_individual_ban_matches_exact_token() -> Result<(), anyhow::Error> {
        let (store, engine) = engine(RevocationPolicy::Permissive);
        let claims = claims(TokenType::Refresh, Utc::now().timestamp_micros());

        engine.ban_token(&claims, "token", 120).await?;

        assert!(engine.is_banned(&claims, "token").await?);
        assert!(!engine.is_banned(&claims, "other").await?);
        let key = RevocationKey::individual(TokenType::Refresh, claims.sub, claims.jti);
        assert!(store.ttl(&key).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_token_writes_no_marker() -> Result<(), anyhow::Error> {
        let (store, engine) = engine(RevocationPolicy::Permissive);
        let claims = claims(TokenType::Access, Utc::now().timestamp_micros());

        engine.ban_token(&claims, "token", 0).await?;
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_global_cutoff_is_inclusive() -> Result<(), anyhow::Error> {
        let (_, engine) = engine(RevocationPolicy::Permissive);
        let now = Utc::now().timestamp_micros();
        let before = claims(TokenType::Access, now);
        let mut at_cutoff = claims(TokenType::Access, now + 10);
        at_cutoff.sub = before.sub;
        let mut after = claims(TokenType::Access, now + 11);
        after.sub = before.sub;

        engine.ban_all(TokenType::Access, before.sub, now + 10).await?;

        assert!(engine.is_banned(&before, "a").await?);
        assert!(engine.is_banned(&at_cutoff, "b").await?);
        assert!(!engine.is_banned(&after, "c").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_global_ban_is_per_token_type() -> Result<(), anyhow::Error> {
        let (store, engine) = engine(RevocationPolicy::Permissive);
        let now = Utc::now().timestamp_micros();
        let refresh = claims(TokenType::Refresh, now);

        engine.ban_all(TokenType::Access, refresh.sub, now).await?;
        assert!(!engine.is_banned(&refresh, "r").await?);

        let ttl = store
            .ttl(&RevocationKey::global(TokenType::Access, refresh.sub))
            .map(|d| d.as_secs());
        assert!(ttl.is_some_and(|secs| secs > 800 && secs <= 900));
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_bans_every_user_for_both_types() -> Result<(), anyhow::Error> {
        let (store, engine) = engine(RevocationPolicy::Permissive);
        let now = Utc::now().timestamp_micros();
        let users: Vec<_> = (0..3).map(|_| Uuid::new_v4()).collect();

        engine.ban_all_sessions_batch(&users, now).await?;

        assert_eq!(store.len(), 6);
        for user in users {
            let mut access = claims(TokenType::Access, now - 1);
            access.sub = user;
            assert!(engine.is_banned(&access, "t").await?);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_cutoff_bans() -> Result<(), anyhow::Error> {
        let (store, engine) = engine(RevocationPolicy::Permissive);
        let claims = claims(TokenType::Access, Utc::now().timestamp_micros());

        store
            .set(&RevocationKey::global(TokenType::Access, claims.sub), "garbage", 60)
            .await?;
        assert!(engine.is_banned(&claims, "t").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_as_transient_failure() {
        let (store, engine) = engine(RevocationPolicy::Permissive);
        store.set_unavailable(true);
        let claims = claims(TokenType::Access, Utc::now().timestamp_micros());

        let result = engine.is_banned(&claims, "t").await;
        assert!(matches!(result, Err(ServiceError::TransientStoreFailure(_))));
    }
}
