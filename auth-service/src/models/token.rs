//! Token claims and the permission snapshot they carry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Access or refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }

    /// Revocation scope for markers of this token type.
    pub fn ban_scope(&self) -> &'static str {
        match self {
            TokenType::Access => "access_banned",
            TokenType::Refresh => "refresh_banned",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission ids copied into a token at issuance.
///
/// A snapshot never follows later grants or removals; the permission graph
/// invalidates stale tokens through revocation instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSnapshot(BTreeSet<Uuid>);

impl PermissionSnapshot {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.0.iter()
    }
}

impl FromIterator<Uuid> for PermissionSnapshot {
    fn from_iter<I: IntoIterator<Item = Uuid>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,
    /// Issued at (Unix timestamp, microseconds)
    pub iat_us: i64,
    /// JWT ID
    pub jti: Uuid,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub permissions: PermissionSnapshot,
}

impl TokenClaims {
    /// Seconds left until expiry, relative to `now` (Unix seconds).
    pub fn remaining_lifetime(&self, now: i64) -> i64 {
        self.exp - now
    }
}

/// Token pair handed out on login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: i64,
    pub refresh_token: String,
    pub refresh_expires_at: i64,
}
