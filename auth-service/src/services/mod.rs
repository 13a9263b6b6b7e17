//! Core services: token codec, revocation, sessions and permissions, plus
//! the store adapters they run on.

pub mod admin;
pub mod database;
pub mod error;
pub mod jwt;
pub mod metrics;
pub mod permission;
pub mod redis;
pub mod revocation;
pub mod session;

pub use admin::{AdminRemoval, AdminService, ADMIN_PERMISSION};
pub use database::{CredentialStore, Database, MockCredentialStore};
pub use error::ServiceError;
pub use jwt::{JwtService, TokenError};
pub use permission::PermissionService;
pub use self::redis::{MockRevocationStore, RedisService, RevocationKey, RevocationStore};
pub use revocation::{RevocationEngine, RevocationPolicy};
pub use session::SessionService;
