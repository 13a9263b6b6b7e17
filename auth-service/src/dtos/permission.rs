use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Permission, PermissionChanges, PermissionSelector, UserPermissions, UserSelector,
};
use crate::services::ServiceError;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    #[schema(example = "admin")]
    pub name: String,
    #[schema(example = "Full access to the permission API")]
    pub description: Option<String>,
}

/// At least one field must be set; `id` wins when both are.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct PermissionSelectorBody {
    pub id: Option<Uuid>,
    #[schema(example = "admin")]
    pub name: Option<String>,
}

impl TryFrom<PermissionSelectorBody> for PermissionSelector {
    type Error = ServiceError;

    fn try_from(body: PermissionSelectorBody) -> Result<Self, Self::Error> {
        PermissionSelector::from_parts(body.id, body.name)
    }
}

/// At least one field must be set; `id` wins when both are.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UserSelectorBody {
    pub id: Option<Uuid>,
    #[schema(example = "alice")]
    pub login: Option<String>,
}

impl TryFrom<UserSelectorBody> for UserSelector {
    type Error = ServiceError;

    fn try_from(body: UserSelectorBody) -> Result<Self, Self::Error> {
        UserSelector::from_parts(body.id, body.login)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PermissionChangesBody {
    #[schema(example = "superuser")]
    pub name: Option<String>,
    pub description: Option<String>,
}

impl From<PermissionChangesBody> for PermissionChanges {
    fn from(body: PermissionChangesBody) -> Self {
        Self {
            name: body.name,
            description: body.description,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePermissionRequest {
    pub permission: PermissionSelectorBody,
    pub changes: PermissionChangesBody,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GrantRequest {
    pub permission: PermissionSelectorBody,
    pub user: UserSelectorBody,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionResponse {
    pub id: Uuid,
    #[schema(example = "admin")]
    pub name: String,
    pub description: Option<String>,
}

impl From<Permission> for PermissionResponse {
    fn from(permission: Permission) -> Self {
        Self {
            id: permission.id,
            name: permission.name,
            description: permission.description,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionsResponse {
    pub permissions: Vec<PermissionResponse>,
}

impl From<Vec<Permission>> for PermissionsResponse {
    fn from(permissions: Vec<Permission>) -> Self {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserPermissionsResponse {
    pub id: Uuid,
    #[schema(example = "alice")]
    pub login: String,
    pub permissions: Vec<PermissionResponse>,
}

impl From<UserPermissions> for UserPermissionsResponse {
    fn from(user: UserPermissions) -> Self {
        Self {
            id: user.id,
            login: user.login,
            permissions: user.permissions.into_iter().map(Into::into).collect(),
        }
    }
}
