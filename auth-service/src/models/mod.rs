pub mod permission;
pub mod selector;
pub mod token;
pub mod user;

pub use permission::{Permission, PermissionChanges};
pub use selector::{PermissionSelector, UserSelector};
pub use token::{PermissionSnapshot, TokenClaims, TokenPair, TokenType};
pub use user::{User, UserPermissions, UserResponse};
