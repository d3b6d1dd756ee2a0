//! Error types for the API service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use commerce::CommerceError;
use identity::AuthError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Failure raised by the commerce core or the identity service beneath it
    #[error(transparent)]
    Commerce(#[from] CommerceError),

    /// Login throttled after repeated failures
    #[error("Too many failed login attempts, try again later")]
    TooManyAttempts,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Commerce(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Commerce(err) => commerce_status(err),
        }
    }
}

fn commerce_status(err: &CommerceError) -> StatusCode {
    match err {
        CommerceError::Validation(_)
        | CommerceError::InvalidQuantity
        | CommerceError::EmptyCart => StatusCode::BAD_REQUEST,
        CommerceError::Unauthorized | CommerceError::UserNotFound => StatusCode::UNAUTHORIZED,
        CommerceError::Forbidden => StatusCode::FORBIDDEN,
        CommerceError::ProductNotFound
        | CommerceError::CategoryNotFound
        | CommerceError::OrderNotFound => StatusCode::NOT_FOUND,
        CommerceError::DuplicateCategory
        | CommerceError::InsufficientStock { .. }
        | CommerceError::AlreadyPaid
        | CommerceError::InvalidTransition { .. }
        | CommerceError::Conflict => StatusCode::CONFLICT,
        CommerceError::Identity(auth) => auth_status(auth),
        CommerceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::DuplicateEmail => StatusCode::CONFLICT,
        AuthError::InvalidCredentials
        | AuthError::TokenInvalid
        | AuthError::TokenExpired
        | AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::PasswordHash(_)
        | AuthError::TokenSigning(_)
        | AuthError::Configuration(_)
        | AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            _ if status.is_server_error() => {
                error!("Request failed: {}", self);
                json!({ "error": "Internal server error" })
            }
            ApiError::Commerce(CommerceError::InsufficientStock {
                product_id,
                requested,
                available,
                ..
            }) => json!({
                "error": self.to_string(),
                "product_id": product_id,
                "requested": requested,
                "available": available,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
