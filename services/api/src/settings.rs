//! Service configuration
//!
//! Values come from the built-in defaults, an optional `config/default` file and
//! finally `SHOP_*` environment variables, with `__` separating nested keys
//! (`SHOP_SERVER__PORT=8080`, `SHOP_JWT__SECRET=...`).

use commerce::CheckoutConfig;
use common::database::DatabaseConfig;
use config::{Config, ConfigError, Environment, File};
use identity::{JwtConfig, RateLimiterConfig};
use serde::Deserialize;
use std::fmt;

/// Listen address
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Backing store for users, catalog, carts and orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Postgres,
    Memory,
}

/// Administrator account created at startup when missing
#[derive(Clone, Deserialize)]
pub struct AdminAccount {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AdminAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminAccount")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Full service configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub storage: StorageKind,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub checkout: CheckoutConfig,
    pub login_throttle: RateLimiterConfig,
    pub admin: Option<AdminAccount>,
}

impl Settings {
    /// Load the configuration from `config/default` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/default")
    }

    /// Load the configuration using the given file stem as the optional file source
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("SHOP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
