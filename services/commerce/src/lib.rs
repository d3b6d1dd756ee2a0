//! Commerce core: catalog, carts, orders and the access gate in front of them
//!
//! Engines talk to storage only through the traits in [`repositories`], so the
//! same code runs on PostgreSQL and on the in-memory store used by tests.
//!
//! ```no_run
//! use commerce::{AccessGate, CheckoutConfig, Stores};
//! use identity::{IdentityService, JwtConfig, MemoryUserRepository, TokenService};
//! use std::sync::Arc;
//!
//! # fn build() -> Result<AccessGate, Box<dyn std::error::Error>> {
//! let tokens = TokenService::new(&JwtConfig::with_secret("change-me"))?;
//! let identity = IdentityService::new(Arc::new(MemoryUserRepository::new()), tokens);
//! let gate = AccessGate::new(identity, Stores::memory(), &CheckoutConfig::default());
//! # Ok(gate)
//! # }
//! ```

pub mod cart;
pub mod catalog;
pub mod error;
pub mod gate;
pub mod models;
pub mod orders;
pub mod repositories;

pub use cart::CartEngine;
pub use catalog::CatalogService;
pub use error::{CommerceError, CommerceResult};
pub use gate::{AccessGate, Caller, Permission, Session};
pub use orders::{CheckoutConfig, OrderEngine};
pub use repositories::{
    CartRepository, CatalogRepository, MemoryStore, OrderRepository, PgCommerceStore, Stores,
};
