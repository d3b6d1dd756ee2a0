//! API service routes

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use commerce::{
    Caller, CommerceError, Session,
    models::{
        CartView, Category, NewCategory, NewProduct, Order, Product, ProductFilter, ProductPage,
        ProductUpdate,
    },
};
use identity::{AuthError, User, validation::normalize_email};
use serde_json::{Value, json};
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth_middleware,
    models::{
        AddCartItemRequest, ChangePasswordRequest, CheckoutRequest, LoginRequest,
        OrderStatusRequest, RatingRequest, RegisterRequest, RestockRequest, SetRoleRequest,
        UpdateCartItemRequest,
    },
    state::AppState,
};

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/me", get(current_user))
        .route("/api/users/me/password", put(change_password))
        .route("/api/users/:id/role", put(set_role))
        .route("/api/products", post(create_product))
        .route("/api/products/:id", put(update_product))
        .route("/api/products/:id/stock", post(restock_product))
        .route("/api/products/:id/rating", post(rate_product))
        .route("/api/categories", post(create_category))
        .route("/api/cart", get(get_cart).delete(clear_cart))
        .route("/api/cart/items", post(add_cart_item))
        .route(
            "/api/cart/items/:product_id",
            put(update_cart_item).delete(remove_cart_item),
        )
        .route("/api/orders", post(checkout).get(my_orders))
        .route("/api/orders/all", get(all_orders))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/pay", put(pay_order))
        .route("/api/orders/:id/status", put(set_order_status))
        .route("/api/orders/:id/cancel", post(cancel_order))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/products", get(list_products))
        .route("/api/products/:id", get(get_product))
        .route("/api/categories", get(list_categories))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db_pool {
        Some(pool) => match common::database::health_check(pool).await {
            Ok(true) => "up",
            _ => "down",
        },
        None => "memory",
    };

    let status = if database == "down" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(json!({
            "status": if status.is_success() { "ok" } else { "degraded" },
            "service": "shop-api",
            "database": database,
        })),
    )
}

// Authentication

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state.gate.register(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Login, throttled per normalized email
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<Session>> {
    let key = normalize_email(&payload.email);
    if !state.login_limiter.is_allowed(&key).await {
        warn!("Rejected throttled login for {}", key);
        return Err(ApiError::TooManyAttempts);
    }

    match state.gate.login(&payload.email, &payload.password).await {
        Ok(session) => {
            state.login_limiter.record_success(&key).await;
            Ok(Json(session))
        }
        Err(err) => {
            if matches!(err, CommerceError::Identity(AuthError::InvalidCredentials)) {
                state.login_limiter.record_failure(&key).await;
            }
            Err(err.into())
        }
    }
}

// Users

async fn list_users(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.gate.list_users(&caller).await?))
}

async fn current_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.gate.get_user(&caller, caller.user_id()).await?))
}

async fn change_password(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    state
        .gate
        .change_password(&caller, &payload.current_password, &payload.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_role(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRoleRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.gate.set_role(&caller, id, payload.role).await?))
}

// Catalog

async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<Json<ProductPage>> {
    Ok(Json(state.gate.list_products(&filter).await?))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.gate.get_product(id).await?))
}

async fn create_product(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<NewProduct>,
) -> ApiResult<impl IntoResponse> {
    let product = state.gate.create_product(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductUpdate>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.gate.update_product(&caller, id, payload).await?))
}

async fn restock_product(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RestockRequest>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.gate.restock(&caller, id, payload.quantity).await?))
}

async fn rate_product(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.gate.rate_product(&caller, id, payload.rating).await?))
}

async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.gate.list_categories().await?))
}

async fn create_category(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<NewCategory>,
) -> ApiResult<impl IntoResponse> {
    let category = state.gate.create_category(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

// Cart

async fn get_cart(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<CartView>> {
    Ok(Json(state.gate.get_cart(&caller).await?))
}

async fn clear_cart(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<CartView>> {
    Ok(Json(state.gate.clear_cart(&caller).await?))
}

async fn add_cart_item(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<AddCartItemRequest>,
) -> ApiResult<Json<CartView>> {
    let cart = state
        .gate
        .add_to_cart(&caller, payload.product_id, payload.quantity)
        .await?;
    Ok(Json(cart))
}

async fn update_cart_item(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> ApiResult<Json<CartView>> {
    let cart = state
        .gate
        .update_cart_item(&caller, product_id, payload.quantity)
        .await?;
    Ok(Json(cart))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Json<CartView>> {
    Ok(Json(state.gate.remove_from_cart(&caller, product_id).await?))
}

// Orders

async fn checkout(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CheckoutRequest>,
) -> ApiResult<impl IntoResponse> {
    let order = state.gate.checkout(&caller, &payload.payment_method).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn my_orders(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<Order>>> {
    let orders = state
        .gate
        .list_orders_for_user(&caller, caller.user_id())
        .await?;
    Ok(Json(orders))
}

async fn all_orders(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.gate.list_all_orders(&caller).await?))
}

async fn get_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.gate.get_order(&caller, id).await?))
}

/// Record the payment provider's result on the order
async fn pay_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payment_result): Json<Value>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.gate.confirm_payment(&caller, id, payment_result).await?))
}

async fn set_order_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OrderStatusRequest>,
) -> ApiResult<Json<Order>> {
    let order = state
        .gate
        .advance_order_status(&caller, id, payload.status)
        .await?;
    Ok(Json(order))
}

async fn cancel_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.gate.cancel_order(&caller, id).await?))
}
