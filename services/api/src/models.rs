//! Request payloads accepted by the HTTP routes
//!
//! Responses reuse the domain types from `identity` and `commerce` directly;
//! those never carry password hashes.

use commerce::models::OrderStatus;
use identity::{NewUser, Role};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl From<RegisterRequest> for NewUser {
    fn from(req: RegisterRequest) -> Self {
        NewUser::new(req.name, req.email, req.password)
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

/// Units to add to a product's stock
#[derive(Deserialize)]
pub struct RestockRequest {
    pub quantity: i32,
}

/// Star rating between 1 and 5
#[derive(Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
}

#[derive(Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// New quantity for a cart line; zero removes it
#[derive(Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: String,
}

#[derive(Deserialize)]
pub struct OrderStatusRequest {
    pub status: OrderStatus,
}
