//! Common library for the Shopping Spree services
//!
//! This crate provides shared functionality used across the services of the
//! workspace: PostgreSQL connectivity, the embedded schema migrations and the
//! storage error type.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::default();
//!     let pool = init_pool(&config).await?;
//!     run_migrations(&pool).await?;
//!     println!("Database health check: {}", health_check(&pool).await?);
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;

pub use error::{DatabaseError, DatabaseResult};
