//! `/auth/*` endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;

use super::error::ApiError;
use crate::dtos::auth::{
    ChangePasswordRequest, CheckoutResponse, LoginRequest, PayloadResponse, RegisterRequest,
    RegisterResponse, TokenResponse,
};
use crate::dtos::{ErrorResponse, MessageResponse};
use crate::middleware::{AccessToken, RefreshToken};
use crate::models::TokenType;
use crate::utils::{Password, ValidatedJson};
use crate::AppState;

/// Register a new user
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 409, description = "Login taken", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .sessions
        .register(&req.login, Password::new(req.password))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse::from(user.sanitized())),
    ))
}

/// Login with login and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful, session cookies set", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .sessions
        .login(&req.login, Password::new(req.password))
        .await?;

    let jar = state.cookies().set_pair(jar, &pair);
    Ok((
        jar,
        Json(TokenResponse {
            access_token: pair.access_token,
            refresh_token: Some(pair.refresh_token),
            token_type: "Bearer".to_string(),
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: Some(pair.refresh_expires_at),
        }),
    ))
}

/// Logout from the current device
#[utoipa::path(
    get,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Both tokens revoked", body = MessageResponse),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    AccessToken(access): AccessToken,
    RefreshToken(refresh): RefreshToken,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.logout(&access, &refresh).await?;
    Ok((
        state.cookies().clear(jar),
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

/// Logout from every device
#[utoipa::path(
    get,
    path = "/auth/logout_all",
    responses(
        (status = 200, description = "All sessions revoked", body = MessageResponse),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout_all(
    State(state): State<AppState>,
    jar: CookieJar,
    AccessToken(access): AccessToken,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.logout_all(&access).await?;
    Ok((
        state.cookies().clear(jar),
        Json(MessageResponse::new("Logged out from all devices")),
    ))
}

/// Change the caller's password
#[utoipa::path(
    put,
    path = "/auth/change_password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 401, description = "Invalid token or wrong current password", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    AccessToken(access): AccessToken,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .sessions
        .change_password(
            &access,
            Password::new(req.old_password),
            Password::new(req.new_password),
        )
        .await?;
    Ok(Json(MessageResponse::new("Password changed")))
}

/// Delete the caller's account
#[utoipa::path(
    delete,
    path = "/auth/delete",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn delete_account(
    State(state): State<AppState>,
    jar: CookieJar,
    AccessToken(access): AccessToken,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.delete_account(&access).await?;
    Ok((state.cookies().clear(jar), StatusCode::NO_CONTENT))
}

/// Issue a new access token from the refresh token
#[utoipa::path(
    get,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Access token refreshed", body = TokenResponse),
        (status = 401, description = "Missing, invalid or revoked refresh token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    RefreshToken(refresh): RefreshToken,
) -> Result<impl IntoResponse, ApiError> {
    let (token, claims) = state.sessions.refresh(&refresh).await?;

    let jar = state.cookies().set_access(jar, &token, claims.exp);
    Ok((
        jar,
        Json(TokenResponse {
            access_token: token,
            refresh_token: None,
            token_type: "Bearer".to_string(),
            access_expires_at: claims.exp,
            refresh_expires_at: None,
        }),
    ))
}

/// Check that the access token is valid and not revoked
#[utoipa::path(
    get,
    path = "/auth/checkout_access",
    responses(
        (status = 200, description = "Token is usable", body = CheckoutResponse),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn checkout_access(
    State(state): State<AppState>,
    AccessToken(access): AccessToken,
) -> Result<impl IntoResponse, ApiError> {
    state
        .sessions
        .authenticate(&access, TokenType::Access)
        .await?;
    Ok(Json(CheckoutResponse::valid(TokenType::Access)))
}

/// Verify the access token and return its payload
#[utoipa::path(
    get,
    path = "/auth/get_payload",
    responses(
        (status = 200, description = "Verified payload", body = PayloadResponse),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn get_payload(
    State(state): State<AppState>,
    AccessToken(access): AccessToken,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state.sessions.payload(&access).await?;
    Ok(Json(PayloadResponse::from(claims)))
}
