//! Error types for the commerce core

use common::DatabaseError;
use identity::AuthError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{OrderStatus, Product};

/// Commerce error type
#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Category not found")]
    CategoryNotFound,

    #[error("A category with this name or slug already exists")]
    DuplicateCategory,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for {name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        name: String,
        requested: i32,
        available: i32,
    },

    #[error("Order not found")]
    OrderNotFound,

    #[error("Order is already paid")]
    AlreadyPaid,

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Authentication required")]
    Unauthorized,

    #[error("Not allowed")]
    Forbidden,

    #[error("User not found")]
    UserNotFound,

    #[error("Concurrent modification, please retry")]
    Conflict,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Identity(#[from] AuthError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl CommerceError {
    pub(crate) fn insufficient_stock(product: &Product, requested: i32) -> Self {
        CommerceError::InsufficientStock {
            product_id: product.id,
            name: product.name.clone(),
            requested,
            available: product.stock,
        }
    }
}

impl From<sqlx::Error> for CommerceError {
    fn from(err: sqlx::Error) -> Self {
        CommerceError::Database(DatabaseError::Query(err))
    }
}

/// Result type for commerce operations
pub type CommerceResult<T> = Result<T, CommerceError>;
