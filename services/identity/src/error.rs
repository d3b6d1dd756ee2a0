//! Error types for the identity service

use common::DatabaseError;
use thiserror::Error;

/// Errors raised by credential, token and user-store operations.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Another account already uses this email address
    #[error("Email address is already registered")]
    DuplicateEmail,

    /// Email or password did not match; deliberately does not say which
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The token is malformed, forged or signed with another key
    #[error("Invalid token")]
    TokenInvalid,

    /// The token was valid but its lifetime has elapsed
    #[error("Token expired")]
    TokenExpired,

    /// No user exists for the given id
    #[error("User not found")]
    UserNotFound,

    /// Input rejected by validation rules
    #[error("{0}")]
    Validation(String),

    /// Password hashing or hash parsing failed
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// Token signing failed
    #[error("Token signing failed: {0}")]
    TokenSigning(String),

    /// Token keys or secrets are missing or unusable
    #[error("Token configuration error: {0}")]
    Configuration(String),

    /// Storage failure
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Type alias for identity results
pub type AuthResult<T> = Result<T, AuthError>;
