pub mod auth;
pub mod metrics;

pub use auth::{
    clear_session_middleware, require_privileged, AccessToken, AuthUser, RefreshToken,
};
pub use metrics::metrics_middleware;
