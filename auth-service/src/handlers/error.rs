use axum::response::{IntoResponse, Response};
use service_core::error::AppError;

use crate::services::ServiceError;

/// Marker left on responses whose session must be dropped client-side.
#[derive(Debug, Clone, Copy)]
pub struct ClearSession;

/// Handler error: any core error, with revoked tokens flagged for cookie cleanup.
#[derive(Debug)]
pub struct ApiError {
    inner: AppError,
    clear_session: bool,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let clear_session = matches!(err, ServiceError::Banned { .. });
        Self {
            inner: err.into(),
            clear_session,
        }
    }
}

impl From<AppError> for ApiError {
    fn from(inner: AppError) -> Self {
        Self {
            inner,
            clear_session: false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.inner.into_response();
        if self.clear_session {
            response.extensions_mut().insert(ClearSession);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenType;
    use axum::http::StatusCode;

    #[test]
    fn test_banned_marks_response() {
        let response = ApiError::from(ServiceError::Banned {
            token_type: TokenType::Access,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.extensions().get::<ClearSession>().is_some());
    }

    #[test]
    fn test_other_errors_leave_session_alone() {
        let response = ApiError::from(ServiceError::invalid_token()).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.extensions().get::<ClearSession>().is_none());
    }
}
