use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{PermissionSnapshot, TokenClaims, TokenType};

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Malformed token: {0}")]
    Malformed(jsonwebtoken::errors::Error),
}

/// JWT service for token generation and validation (HS256, shared secret).
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iat", "jti"]);

        tracing::info!("JWT service initialized with HS256 secret");

        Self {
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            validation,
            access_ttl: Duration::seconds(config.access_expires_seconds),
            refresh_ttl: Duration::seconds(config.refresh_expires_seconds),
        }
    }

    /// Configured lifetime for a token type.
    pub fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a fresh token with a new `jti`.
    pub fn issue(
        &self,
        subject: Uuid,
        token_type: TokenType,
        permissions: PermissionSnapshot,
        ttl: Duration,
    ) -> Result<(String, TokenClaims), TokenError> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: subject,
            iat: now.timestamp(),
            iat_us: now.timestamp_micros(),
            jti: Uuid::new_v4(),
            exp: (now + ttl).timestamp(),
            token_type,
            permissions,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)?;

        Ok((token, claims))
    }

    /// Sign a token of the given type with its configured lifetime.
    pub fn issue_default(
        &self,
        subject: Uuid,
        token_type: TokenType,
        permissions: PermissionSnapshot,
    ) -> Result<(String, TokenClaims), TokenError> {
        self.issue(subject, token_type, permissions, self.ttl(token_type))
    }

    /// Verify signature and expiry, then return the claims.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e),
            })
    }
}
