use service_core::error::AppError;
use thiserror::Error;

use crate::models::TokenType;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthenticated(String),

    /// Token is valid but revoked. The boundary layer clears the session.
    #[error("{token_type} token has been revoked")]
    Banned { token_type: TokenType },

    #[error("{0}")]
    Forbidden(String),

    #[error("Revocation store unavailable: {0}")]
    TransientStoreFailure(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn invalid_credentials() -> Self {
        ServiceError::Unauthenticated("Invalid login or password".to_string())
    }

    pub fn invalid_token() -> Self {
        ServiceError::Unauthenticated("Invalid or expired token".to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::BadRequest(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::Conflict(e) => AppError::Conflict(anyhow::anyhow!(e)),
            ServiceError::NotFound(e) => AppError::NotFound(anyhow::anyhow!(e)),
            ServiceError::Unauthenticated(e) => AppError::AuthError(anyhow::anyhow!(e)),
            err @ ServiceError::Banned { .. } => {
                AppError::Unauthorized(anyhow::anyhow!(err.to_string()))
            }
            ServiceError::Forbidden(e) => AppError::Forbidden(anyhow::anyhow!(e)),
            ServiceError::TransientStoreFailure(e) => AppError::ServiceUnavailable(e),
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
