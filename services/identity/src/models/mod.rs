//! Identity service models

pub mod role;
pub mod user;

// Re-export for convenience
pub use role::Role;
pub use user::{NewUser, User, UserRecord};
