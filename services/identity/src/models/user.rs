//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::Role;

/// Public view of an account. Carries no credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored user row, including the password hash.
///
/// The hash is only readable inside this crate; everything handed to other
/// crates goes through [`UserRecord::to_user`].
#[derive(Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub(crate) password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub(crate) fn new(name: String, email: String, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Strip credential material
    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// New user registration payload
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl NewUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_redacts_hash() {
        let record = UserRecord::new(
            "Alice".to_string(),
            "alice@x.com".to_string(),
            "$argon2id$v=19$secret".to_string(),
            Role::Customer,
        );

        let debug = format!("{:?}", record);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_to_user_keeps_profile_fields() {
        let record = UserRecord::new(
            "Alice".to_string(),
            "alice@x.com".to_string(),
            "hash".to_string(),
            Role::Admin,
        );

        let user = record.to_user();
        assert_eq!(user.id, record.id);
        assert_eq!(user.email, "alice@x.com");
        assert_eq!(user.role, Role::Admin);
    }
}
