//! User model - one row per login, soft-deleted rather than removed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::Permission;

/// User entity.
///
/// `password` is a PHC string (algorithm id, cost parameters, salt, digest);
/// it never leaves the service.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub password: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl User {
    /// Create a new, active user.
    pub fn new(login: String, password: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            login,
            password,
            is_deleted: false,
            created_at: now,
            modified_at: now,
        }
    }

    /// Convert to sanitized response (no password material).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse {
            id: self.id,
            login: self.login.clone(),
        }
    }
}

/// User response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub login: String,
}

/// A user together with its current grants.
#[derive(Debug, Clone, Serialize)]
pub struct UserPermissions {
    pub id: Uuid,
    pub login: String,
    pub permissions: Vec<Permission>,
}

impl UserPermissions {
    pub fn new(user: &User, permissions: Vec<Permission>) -> Self {
        Self {
            id: user.id,
            login: user.login.clone(),
            permissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_is_active() {
        let user = User::new("alice".to_string(), "$argon2id$stub".to_string());
        assert!(!user.is_deleted);
        assert_eq!(user.created_at, user.modified_at);
    }

    #[test]
    fn test_sanitized_drops_password() {
        let user = User::new("alice".to_string(), "$argon2id$stub".to_string());
        let json = serde_json::to_value(user.sanitized()).unwrap();
        assert_eq!(json["login"], "alice");
        assert!(json.get("password").is_none());
    }
}
