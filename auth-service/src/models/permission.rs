//! Permission model - named grants attached to users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Permission entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub modified_at: DateTime<Utc>,
}

impl Permission {
    /// Create a new permission.
    pub fn new(name: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            created_at: now,
            modified_at: now,
        }
    }
}

/// Partial update of a permission. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl PermissionChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }

    /// Apply the changes in place, bumping `modified_at`.
    pub fn apply(&self, permission: &mut Permission) {
        if let Some(name) = &self.name {
            permission.name = name.clone();
        }
        if let Some(description) = &self.description {
            permission.description = Some(description.clone());
        }
        permission.modified_at = Utc::now();
    }
}
