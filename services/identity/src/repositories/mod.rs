//! User storage
//!
//! [`UserRepository`] abstracts the user table. [`PgUserRepository`] is the
//! PostgreSQL implementation, [`MemoryUserRepository`] keeps users in process
//! for tests and single-node demos.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AuthResult;
use crate::models::{Role, UserRecord};

pub mod memory;
pub mod user;

pub use memory::MemoryUserRepository;
pub use user::PgUserRepository;

/// User repository.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user.
    ///
    /// Fails with `AuthError::DuplicateEmail` when the email is taken.
    async fn insert(&self, user: &UserRecord) -> AuthResult<()>;

    /// Find a user by normalized email
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<UserRecord>>;

    /// Find a user by ID
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<UserRecord>>;

    /// All users, oldest first
    async fn list(&self) -> AuthResult<Vec<UserRecord>>;

    /// Replace the stored hash. Returns `false` when the user does not exist.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> AuthResult<bool>;

    /// Change the role. Returns `false` when the user does not exist.
    async fn update_role(&self, id: Uuid, role: Role) -> AuthResult<bool>;
}
