pub mod auth;
pub mod permission;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body, mirrors `service_core::error::ErrorResponse`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Invalid login or password")]
    pub detail: String,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Permission deleted")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
