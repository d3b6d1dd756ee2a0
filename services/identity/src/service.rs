//! Identity and credential operations
//!
//! Every write of a password goes through [`IdentityService`], which hashes it
//! before it reaches storage. Hashing and verification run on the blocking
//! pool.

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::jwt::{Claims, TokenService};
use crate::models::{NewUser, Role, User, UserRecord};
use crate::password;
use crate::repositories::UserRepository;
use crate::validation::{normalize_email, validate_email, validate_name, validate_password};

/// Identity service
#[derive(Clone)]
pub struct IdentityService {
    users: Arc<dyn UserRepository>,
    tokens: TokenService,
}

impl IdentityService {
    pub fn new(users: Arc<dyn UserRepository>, tokens: TokenService) -> Self {
        Self { users, tokens }
    }

    /// Register a customer account
    pub async fn register(&self, new_user: NewUser) -> AuthResult<User> {
        self.create(new_user, Role::Customer).await
    }

    /// Register an administrator account
    pub async fn register_admin(&self, new_user: NewUser) -> AuthResult<User> {
        self.create(new_user, Role::Admin).await
    }

    #[instrument(skip(self, new_user), fields(role = %role))]
    async fn create(&self, new_user: NewUser, role: Role) -> AuthResult<User> {
        let name = new_user.name.trim().to_string();
        let email = normalize_email(&new_user.email);

        validate_name(&name).map_err(AuthError::Validation)?;
        validate_email(&email).map_err(AuthError::Validation)?;
        validate_password(&new_user.password).map_err(AuthError::Validation)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = hash_blocking(new_user.password).await?;
        let record = UserRecord::new(name, email, password_hash, role);
        self.users.insert(&record).await?;

        info!(user_id = %record.id, "User registered");
        Ok(record.to_user())
    }

    /// Check an email/password pair.
    ///
    /// Unknown email and wrong password both yield `InvalidCredentials`.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> AuthResult<User> {
        let email = normalize_email(email);
        let password = password.to_string();

        match self.users.find_by_email(&email).await? {
            Some(record) => {
                let hash = record.password_hash.clone();
                if verify_blocking(password, hash).await? {
                    Ok(record.to_user())
                } else {
                    Err(AuthError::InvalidCredentials)
                }
            }
            None => {
                tokio::task::spawn_blocking(move || password::verify_dummy(&password))
                    .await
                    .map_err(|e| AuthError::PasswordHash(e.to_string()))??;
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Issue a signed token for the user
    pub fn issue_token(&self, user: &User) -> AuthResult<String> {
        self.tokens.issue(user)
    }

    /// Validate a token without touching storage
    pub fn resolve_token(&self, token: &str) -> AuthResult<Claims> {
        self.tokens.resolve(token)
    }

    /// Lifetime of issued tokens in seconds
    pub fn token_ttl_seconds(&self) -> u64 {
        self.tokens.ttl_seconds()
    }

    /// Load a user by id
    pub async fn get_user(&self, id: Uuid) -> AuthResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .map(|record| record.to_user())
            .ok_or(AuthError::UserNotFound)
    }

    /// All users, oldest first
    pub async fn list_users(&self) -> AuthResult<Vec<User>> {
        Ok(self
            .users
            .list()
            .await?
            .iter()
            .map(UserRecord::to_user)
            .collect())
    }

    /// Replace a password after checking the current one
    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let record = self
            .users
            .find_by_id(id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !verify_blocking(current_password.to_string(), record.password_hash.clone()).await? {
            return Err(AuthError::InvalidCredentials);
        }

        validate_password(new_password).map_err(AuthError::Validation)?;
        let password_hash = hash_blocking(new_password.to_string()).await?;

        if !self.users.update_password(id, &password_hash).await? {
            return Err(AuthError::UserNotFound);
        }

        info!(user_id = %id, "Password changed");
        Ok(())
    }

    /// Change a user's role
    pub async fn set_role(&self, id: Uuid, role: Role) -> AuthResult<User> {
        if !self.users.update_role(id, role).await? {
            return Err(AuthError::UserNotFound);
        }

        info!(user_id = %id, role = %role, "Role changed");
        self.get_user(id).await
    }
}

async fn hash_blocking(password: String) -> AuthResult<String> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?
}

async fn verify_blocking(password: String, hash: String) -> AuthResult<bool> {
    tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?
}
