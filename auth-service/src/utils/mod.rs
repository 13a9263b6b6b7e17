pub mod password;
pub mod validation;

pub use password::{Password, PasswordHashString, PasswordService};
pub use validation::ValidatedJson;
