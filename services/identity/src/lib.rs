//! Identity and credential store
//!
//! Users, Argon2 password hashes, roles and signed access tokens. The
//! [`IdentityService`] is the only way in: it validates input, hashes every
//! password it writes and never hands a hash to callers.

pub mod error;
pub mod jwt;
pub mod models;
pub mod password;
pub mod rate_limiter;
pub mod repositories;
pub mod service;
pub mod validation;

pub use error::{AuthError, AuthResult};
pub use jwt::{Claims, JwtConfig, TokenService};
pub use models::{NewUser, Role, User};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use repositories::{MemoryUserRepository, PgUserRepository, UserRepository};
pub use service::IdentityService;
