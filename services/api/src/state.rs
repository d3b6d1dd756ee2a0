//! Application state shared across handlers

use commerce::{AccessGate, Stores};
use common::database::{health_check, init_pool, run_migrations};
use identity::{
    AuthError, IdentityService, MemoryUserRepository, NewUser, PgUserRepository, RateLimiter,
    TokenService,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::settings::{AdminAccount, Settings, StorageKind};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gate: AccessGate,
    pub login_limiter: RateLimiter,
    /// Present only when running on PostgreSQL
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Wire the stores and services selected by the configuration
    pub async fn build(settings: &Settings) -> anyhow::Result<Self> {
        let tokens = TokenService::new(&settings.jwt)?;

        let (identity, stores, db_pool) = match settings.storage {
            StorageKind::Postgres => {
                let pool = init_pool(&settings.database).await?;
                run_migrations(&pool).await?;
                if !health_check(&pool).await? {
                    anyhow::bail!("Failed to connect to database");
                }
                info!("Database connection successful");

                let users = Arc::new(PgUserRepository::new(pool.clone()));
                (
                    IdentityService::new(users, tokens),
                    Stores::postgres(pool.clone()),
                    Some(pool),
                )
            }
            StorageKind::Memory => {
                info!("Using the in-memory store; data is lost on shutdown");
                let users = Arc::new(MemoryUserRepository::new());
                (IdentityService::new(users, tokens), Stores::memory(), None)
            }
        };

        if let Some(admin) = &settings.admin {
            ensure_admin(&identity, admin).await?;
        }

        Ok(Self {
            gate: AccessGate::new(identity, stores, &settings.checkout),
            login_limiter: RateLimiter::new(settings.login_throttle.clone()),
            db_pool,
        })
    }
}

/// Create the configured administrator unless the email is already taken
async fn ensure_admin(identity: &IdentityService, admin: &AdminAccount) -> anyhow::Result<()> {
    let account = NewUser::new(&admin.name, &admin.email, &admin.password);
    match identity.register_admin(account).await {
        Ok(user) => {
            info!("Bootstrapped administrator {}", user.email);
            Ok(())
        }
        Err(AuthError::DuplicateEmail) => {
            info!("Administrator {} already exists", admin.email);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
