//! In-process user repository

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::UserRepository;
use crate::error::{AuthError, AuthResult};
use crate::models::{Role, UserRecord};

#[derive(Default)]
struct Users {
    by_id: HashMap<Uuid, UserRecord>,
    id_by_email: HashMap<String, Uuid>,
}

/// User repository backed by a map behind a lock
#[derive(Clone, Default)]
pub struct MemoryUserRepository {
    users: Arc<RwLock<Users>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn insert(&self, user: &UserRecord) -> AuthResult<()> {
        let mut users = self.users.write().await;

        if users.id_by_email.contains_key(&user.email) {
            return Err(AuthError::DuplicateEmail);
        }

        users.id_by_email.insert(user.email.clone(), user.id);
        users.by_id.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users
            .id_by_email
            .get(email)
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<UserRecord>> {
        Ok(self.users.read().await.by_id.get(&id).cloned())
    }

    async fn list(&self) -> AuthResult<Vec<UserRecord>> {
        let users = self.users.read().await;
        let mut all: Vec<UserRecord> = users.by_id.values().cloned().collect();
        all.sort_by_key(|u| u.created_at);
        Ok(all)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> AuthResult<bool> {
        let mut users = self.users.write().await;
        Ok(match users.by_id.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn update_role(&self, id: Uuid, role: Role) -> AuthResult<bool> {
        let mut users = self.users.write().await;
        Ok(match users.by_id.get_mut(&id) {
            Some(user) => {
                user.role = role;
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }
}
