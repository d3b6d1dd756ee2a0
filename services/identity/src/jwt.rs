//! JWT service for token generation and validation
//!
//! Tokens carry the user id and role and are signed either with a shared
//! secret (HS256) or with an RSA key pair (RS256), depending on which keys are
//! configured.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::models::{Role, User};

/// JWT configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Shared secret for HS256 signing
    pub secret: Option<String>,
    /// RSA private key (PEM text or path to a PEM file); enables RS256 together with `public_key`
    pub private_key: Option<String>,
    /// RSA public key (PEM text or path to a PEM file)
    pub public_key: Option<String>,
    /// Token lifetime in seconds (default: 1 hour)
    pub ttl_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: None,
            private_key: None,
            public_key: None,
            ttl_seconds: 3600,
        }
    }
}

impl JwtConfig {
    /// HS256 configuration with the given secret
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Self::default()
        }
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("public_key", &self.public_key.is_some())
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

/// Read a PEM value that is either inline or a path to a file
fn load_pem(value: &str) -> AuthResult<String> {
    if value.starts_with("-----BEGIN") {
        return Ok(value.to_string());
    }

    std::fs::read_to_string(value)
        .map(|pem| pem.trim().to_string())
        .map_err(|e| AuthError::Configuration(format!("Failed to read key file {}: {}", value, e)))
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Role at issue time
    pub role: Role,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

/// JWT service
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    validation: Validation,
    ttl_seconds: u64,
}

impl TokenService {
    /// Initialize a new token service from configuration
    pub fn new(config: &JwtConfig) -> AuthResult<Self> {
        let (algorithm, encoding_key, decoding_key) =
            match (&config.private_key, &config.public_key, &config.secret) {
                (Some(private_key), Some(public_key), _) => {
                    let private_pem = load_pem(private_key)?;
                    let public_pem = load_pem(public_key)?;
                    let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                        .map_err(|e| AuthError::Configuration(e.to_string()))?;
                    let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                        .map_err(|e| AuthError::Configuration(e.to_string()))?;
                    (Algorithm::RS256, encoding_key, decoding_key)
                }
                (_, _, Some(secret)) if !secret.is_empty() => (
                    Algorithm::HS256,
                    EncodingKey::from_secret(secret.as_bytes()),
                    DecodingKey::from_secret(secret.as_bytes()),
                ),
                _ => {
                    return Err(AuthError::Configuration(
                        "either jwt.secret or both jwt.private_key and jwt.public_key must be set"
                            .to_string(),
                    ));
                }
            };

        if config.ttl_seconds == 0 {
            return Err(AuthError::Configuration(
                "jwt.ttl_seconds must be positive".to_string(),
            ));
        }

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(TokenService {
            encoding_key,
            decoding_key,
            algorithm,
            validation,
            ttl_seconds: config.ttl_seconds,
        })
    }

    /// Issue a signed token for a user
    pub fn issue(&self, user: &User) -> AuthResult<String> {
        let now = unix_now()?;
        let claims = Claims {
            sub: user.id,
            role: user.role,
            iat: now,
            exp: now + self.ttl_seconds,
        };

        self.sign(&claims)
    }

    /// Validate a token and return its claims
    pub fn resolve(&self, token: &str) -> AuthResult<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })
    }

    /// Token lifetime in seconds
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    fn sign(&self, claims: &Claims) -> AuthResult<String> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenSigning(e.to_string()))
    }
}

fn unix_now() -> AuthResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AuthError::TokenSigning(format!("Failed to get current time: {}", e)))
}
