//! Lookup criteria that name an entity either by id or by a unique name.

use std::fmt;
use uuid::Uuid;

use crate::services::ServiceError;

const NOT_ENOUGH_INFORMATION: &str = "not enough information";

/// Identifies a permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionSelector {
    Id(Uuid),
    Name(String),
}

impl PermissionSelector {
    /// Build from the optional request fields. The id wins when both are set.
    pub fn from_parts(id: Option<Uuid>, name: Option<String>) -> Result<Self, ServiceError> {
        match (id, non_blank(name)) {
            (Some(id), _) => Ok(Self::Id(id)),
            (None, Some(name)) => Ok(Self::Name(name)),
            (None, None) => Err(ServiceError::BadRequest(NOT_ENOUGH_INFORMATION.into())),
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }
}

impl fmt::Display for PermissionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {}", id),
            Self::Name(name) => write!(f, "name '{}'", name),
        }
    }
}

/// Identifies a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSelector {
    Id(Uuid),
    Login(String),
}

impl UserSelector {
    pub fn from_parts(id: Option<Uuid>, login: Option<String>) -> Result<Self, ServiceError> {
        match (id, non_blank(login)) {
            (Some(id), _) => Ok(Self::Id(id)),
            (None, Some(login)) => Ok(Self::Login(login)),
            (None, None) => Err(ServiceError::BadRequest(NOT_ENOUGH_INFORMATION.into())),
        }
    }

    pub fn login(login: impl Into<String>) -> Self {
        Self::Login(login.into())
    }
}

impl fmt::Display for UserSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {}", id),
            Self::Login(login) => write!(f, "login '{}'", login),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
