use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::handlers::cookies::{CookieSettings, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::handlers::error::{ApiError, ClearSession};
use crate::models::{TokenClaims, TokenType};
use crate::services::ServiceError;
use crate::AppState;

/// Header carrying the refresh token for clients without cookies.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(name)
        .map(|c| c.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Raw access token from the `Authorization: Bearer` header or the access cookie.
pub struct AccessToken(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AccessToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer(&parts.headers)
            .or_else(|| cookie(&parts.headers, ACCESS_COOKIE))
            .map(AccessToken)
            .ok_or_else(|| ServiceError::Unauthenticated("Missing access token".to_string()).into())
    }
}

/// Raw refresh token from the refresh cookie or `x-refresh-token` header.
pub struct RefreshToken(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RefreshToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        cookie(&parts.headers, REFRESH_COOKIE)
            .or_else(|| {
                parts
                    .headers
                    .get(REFRESH_TOKEN_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
                    .filter(|value| !value.is_empty())
            })
            .map(RefreshToken)
            .ok_or_else(|| ServiceError::Unauthenticated("Missing refresh token".to_string()).into())
    }
}

/// Admit only callers whose access token carries every privileged permission.
/// The verified claims are left in the request extensions.
pub async fn require_privileged(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = req.into_parts();
    let AccessToken(token) = AccessToken::from_request_parts(&mut parts, &state).await?;
    let mut req = Request::from_parts(parts, body);

    let claims = state.sessions.authenticate(&token, TokenType::Access).await?;
    state.permissions.check_privileged(&claims).await?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Expire the session cookies on responses flagged with [`ClearSession`].
pub async fn clear_session_middleware(
    State(settings): State<CookieSettings>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;

    if response.extensions().get::<ClearSession>().is_some() {
        for cookie in settings.cleared() {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode session cookie"),
            }
        }
    }

    response
}

/// Claims placed by [`require_privileged`].
pub struct AuthUser(pub TokenClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<TokenClaims>().ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "Auth claims missing from request extensions"
            ))
        })?;

        Ok(AuthUser(claims.clone()))
    }
}
