use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{PermissionSnapshot, TokenClaims, TokenType, UserResponse};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 4, max = 60, message = "Login must be 4 to 60 characters"))]
    #[schema(example = "alice", min_length = 4)]
    pub login: String,

    #[validate(length(min = 4, message = "Password must be at least 4 characters"))]
    #[schema(example = "secret1", min_length = 4)]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    #[schema(example = "alice")]
    pub login: String,
}

impl From<UserResponse> for RegisterResponse {
    fn from(user: UserResponse) -> Self {
        Self {
            id: user.id,
            login: user.login,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Login is required"))]
    #[schema(example = "alice")]
    pub login: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "secret1")]
    pub password: String,
}

/// Tokens are also set as cookies; the body is for non-browser clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Unix timestamp (seconds)
    pub access_expires_at: i64,
    /// Unix timestamp (seconds)
    pub refresh_expires_at: Option<i64>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 4, message = "Password must be at least 4 characters"))]
    pub old_password: String,

    #[validate(length(min = 4, message = "Password must be at least 4 characters"))]
    pub new_password: String,
}

/// Verified token payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct PayloadResponse {
    pub user_id: Uuid,
    pub jti: Uuid,
    #[schema(example = "access")]
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
    pub permissions: Vec<Uuid>,
}

impl From<TokenClaims> for PayloadResponse {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.sub,
            jti: claims.jti,
            token_type: claims.token_type.to_string(),
            iat: claims.iat,
            exp: claims.exp,
            permissions: snapshot_ids(&claims.permissions),
        }
    }
}

fn snapshot_ids(snapshot: &PermissionSnapshot) -> Vec<Uuid> {
    snapshot.iter().copied().collect()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub valid: bool,
    #[schema(example = "access")]
    pub token_type: String,
}

impl CheckoutResponse {
    pub fn valid(token_type: TokenType) -> Self {
        Self {
            valid: true,
            token_type: token_type.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_validation() {
        let short = RegisterRequest {
            login: "abc".to_string(),
            password: "secret".to_string(),
        };
        assert!(short.validate().is_err());

        let ok = RegisterRequest {
            login: "alice".to_string(),
            password: "abcd".to_string(),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_change_password_validation() {
        let req = ChangePasswordRequest {
            old_password: "abcd".to_string(),
            new_password: "abc".to_string(),
        };
        assert!(req.validate().is_err());
    }
}
