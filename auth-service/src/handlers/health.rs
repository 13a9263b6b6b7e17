use axum::{extract::State, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::AppState;

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::ServiceUnavailable("database".to_string())
    })?;

    state.revocation_store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Redis health check failed");
        AppError::ServiceUnavailable("redis".to_string())
    })?;

    Ok(Json(json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
