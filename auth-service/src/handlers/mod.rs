pub mod auth;
pub mod cookies;
pub mod error;
pub mod health;
pub mod metrics;
pub mod permission;

pub use error::ApiError;
