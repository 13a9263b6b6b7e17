//! `/permission/*` endpoints. Every route sits behind `require_privileged`.

use axum::{extract::State, Json};

use super::error::ApiError;
use crate::dtos::permission::{
    CreatePermissionRequest, GrantRequest, PermissionResponse, PermissionSelectorBody,
    PermissionsResponse, UpdatePermissionRequest, UserPermissionsResponse, UserSelectorBody,
};
use crate::dtos::{ErrorResponse, MessageResponse};
use crate::middleware::AuthUser;
use crate::models::{PermissionSelector, UserSelector};
use crate::utils::ValidatedJson;
use crate::AppState;

/// Create a permission
#[utoipa::path(
    post,
    path = "/permission/create",
    request_body = CreatePermissionRequest,
    responses(
        (status = 200, description = "Permission created", body = PermissionResponse),
        (status = 403, description = "Caller lacks privileged permissions", body = ErrorResponse),
        (status = 409, description = "Name taken", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn create(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreatePermissionRequest>,
) -> Result<Json<PermissionResponse>, ApiError> {
    let permission = state
        .permissions
        .create(&req.name, req.description.as_deref())
        .await?;
    Ok(Json(permission.into()))
}

/// Delete a permission and revoke its holders' sessions
#[utoipa::path(
    delete,
    path = "/permission/delete",
    request_body = PermissionSelectorBody,
    responses(
        (status = 200, description = "Permission deleted", body = MessageResponse),
        (status = 400, description = "Neither id nor name given", body = ErrorResponse),
        (status = 404, description = "No such permission", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ValidatedJson(req): ValidatedJson<PermissionSelectorBody>,
) -> Result<Json<MessageResponse>, ApiError> {
    let selector = PermissionSelector::try_from(req)?;
    state.permissions.delete(&selector).await?;

    tracing::info!(caller = %caller.sub, "Permission {} deleted", selector);
    Ok(Json(MessageResponse::new(format!(
        "Permission {} deleted",
        selector
    ))))
}

/// Rename or describe a permission and revoke its holders' sessions
#[utoipa::path(
    put,
    path = "/permission/update",
    request_body = UpdatePermissionRequest,
    responses(
        (status = 200, description = "Permission updated", body = PermissionResponse),
        (status = 400, description = "Bad selector or empty change set", body = ErrorResponse),
        (status = 404, description = "No such permission", body = ErrorResponse),
        (status = 409, description = "New name taken", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn update(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<UpdatePermissionRequest>,
) -> Result<Json<PermissionResponse>, ApiError> {
    let selector = PermissionSelector::try_from(req.permission)?;
    let permission = state
        .permissions
        .update(&selector, &req.changes.into())
        .await?;
    Ok(Json(permission.into()))
}

/// List every permission
#[utoipa::path(
    get,
    path = "/permission/get_all",
    responses(
        (status = 200, description = "All permissions", body = PermissionsResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn get_all(State(state): State<AppState>) -> Result<Json<PermissionsResponse>, ApiError> {
    Ok(Json(state.permissions.get_all().await?.into()))
}

/// Grant a permission to a user
#[utoipa::path(
    post,
    path = "/permission/assign",
    request_body = GrantRequest,
    responses(
        (status = 200, description = "User and its permissions", body = UserPermissionsResponse),
        (status = 404, description = "No such user or permission", body = ErrorResponse),
        (status = 409, description = "Already granted", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn assign(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<GrantRequest>,
) -> Result<Json<UserPermissionsResponse>, ApiError> {
    let permission = PermissionSelector::try_from(req.permission)?;
    let user = UserSelector::try_from(req.user)?;
    let result = state.permissions.assign(&permission, &user).await?;
    Ok(Json(result.into()))
}

/// Take a permission away from a user
#[utoipa::path(
    delete,
    path = "/permission/take_away",
    request_body = GrantRequest,
    responses(
        (status = 200, description = "User and its permissions", body = UserPermissionsResponse),
        (status = 404, description = "No such user or permission", body = ErrorResponse),
        (status = 409, description = "User does not have the permission", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn take_away(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<GrantRequest>,
) -> Result<Json<UserPermissionsResponse>, ApiError> {
    let permission = PermissionSelector::try_from(req.permission)?;
    let user = UserSelector::try_from(req.user)?;
    let result = state.permissions.take_away(&permission, &user).await?;
    Ok(Json(result.into()))
}

/// List a user's permissions
#[utoipa::path(
    post,
    path = "/permission/get_user_permissions",
    request_body = UserSelectorBody,
    responses(
        (status = 200, description = "The user's permissions", body = PermissionsResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn get_user_permissions(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<UserSelectorBody>,
) -> Result<Json<PermissionsResponse>, ApiError> {
    let user = UserSelector::try_from(req)?;
    let result = state.permissions.get_user_permissions(&user).await?;
    Ok(Json(result.permissions.into()))
}
