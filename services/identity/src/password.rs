//! Argon2 password hashing
//!
//! Hashes are PHC strings with an embedded random salt, so two hashes of the
//! same password never compare equal.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use std::sync::OnceLock;

use crate::error::{AuthError, AuthResult};

/// Hash a plaintext password with a fresh salt
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?
        .to_string();

    Ok(password_hash)
}

/// Check a plaintext password against a stored PHC hash
pub fn verify_password(password: &str, password_hash: &str) -> AuthResult<bool> {
    let parsed_hash =
        PasswordHash::new(password_hash).map_err(|e| AuthError::PasswordHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Run one verification against a throwaway hash.
///
/// Used when the account does not exist so that an unknown email costs the
/// same as a wrong password.
pub fn verify_dummy(password: &str) -> AuthResult<()> {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();

    let hash = match DUMMY_HASH.get() {
        Some(hash) => hash,
        None => {
            let hash = hash_password("dummy-password-for-timing")?;
            DUMMY_HASH.get_or_init(|| hash)
        }
    };

    verify_password(password, hash).map(|_| ())
}
