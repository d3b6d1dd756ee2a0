//! Commerce storage
//!
//! Three traits cover the catalog, carts and orders. [`MemoryStore`] implements
//! all of them over one lock; [`PgCommerceStore`] implements them on
//! PostgreSQL. Every operation that has to be atomic is a single trait call,
//! so neither engine ever holds a lock or a transaction across calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::CommerceResult;
use crate::models::{
    Cart, Category, CheckoutPlan, Order, Placement, Product, ProductFilter, ProductPage,
    StatusChange,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgCommerceStore;

/// Products and categories
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Fails with `DuplicateCategory` when the name or slug is taken.
    async fn insert_category(&self, category: &Category) -> CommerceResult<()>;

    /// All categories ordered by name
    async fn list_categories(&self) -> CommerceResult<Vec<Category>>;

    async fn find_category(&self, id: Uuid) -> CommerceResult<Option<Category>>;

    async fn insert_product(&self, product: &Product) -> CommerceResult<()>;

    /// Persist descriptive fields and price. Stock and rating are left alone.
    /// Returns `false` when the product does not exist.
    async fn update_product_details(&self, product: &Product) -> CommerceResult<bool>;

    async fn find_product(&self, id: Uuid) -> CommerceResult<Option<Product>>;

    /// Products for the given ids. Unknown ids are skipped.
    async fn find_products(&self, ids: &[Uuid]) -> CommerceResult<Vec<Product>>;

    async fn list_products(&self, filter: &ProductFilter) -> CommerceResult<ProductPage>;

    /// Take `quantity` units if at least that many are in stock.
    ///
    /// Fails with `InvalidQuantity`, `ProductNotFound` or `InsufficientStock`
    /// and leaves stock untouched in every failure case.
    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> CommerceResult<Product>;

    /// Return `quantity` units to stock
    async fn increment_stock(&self, id: Uuid, quantity: i32) -> CommerceResult<Product>;

    /// Fold a 1 to 5 star rating into the product's aggregate
    async fn record_rating(&self, id: Uuid, stars: u8) -> CommerceResult<Product>;
}

/// One cart per user
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// The user's cart, created empty on first access
    async fn load_or_create(&self, user_id: Uuid) -> CommerceResult<Cart>;

    /// Compare-and-swap save.
    ///
    /// Writes only if the stored version still equals `cart.version`, then
    /// bumps the stored version. Returns `false` when another writer won.
    async fn save(&self, cart: &Cart) -> CommerceResult<bool>;
}

/// Orders and their lifecycle
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Place an order in one atomic step.
    ///
    /// Checks every line against current stock (`InsufficientStock`) and price,
    /// then the cart version. Any price or version mismatch yields
    /// [`Placement::Stale`] without writing anything. On success stock is
    /// decremented, the order stored and the cart emptied.
    async fn place_order(&self, plan: &CheckoutPlan) -> CommerceResult<Placement>;

    async fn find_order(&self, id: Uuid) -> CommerceResult<Option<Order>>;

    /// A user's orders, newest first
    async fn list_orders_for_user(&self, user_id: Uuid) -> CommerceResult<Vec<Order>>;

    /// Every order, newest first
    async fn list_orders(&self) -> CommerceResult<Vec<Order>>;

    /// Apply `change` if the order is still in `change.from`. Restocking, when
    /// requested, happens in the same atomic step.
    async fn transition(&self, id: Uuid, change: &StatusChange) -> CommerceResult<bool>;

    /// Mark an unpaid order paid. Returns `false` if it is missing or already
    /// paid.
    async fn mark_paid(
        &self,
        id: Uuid,
        payment_result: &serde_json::Value,
        paid_at: DateTime<Utc>,
    ) -> CommerceResult<bool>;
}

/// The three stores an engine set runs on
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub orders: Arc<dyn OrderRepository>,
}

impl Stores {
    /// All three backed by one in-process store
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            catalog: store.clone(),
            carts: store.clone(),
            orders: store,
        }
    }

    /// All three backed by PostgreSQL
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgCommerceStore::new(pool));
        Self {
            catalog: store.clone(),
            carts: store.clone(),
            orders: store,
        }
    }
}
