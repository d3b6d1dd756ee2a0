//! In-process commerce store
//!
//! Every table lives behind one mutex, so each trait call is atomic with
//! respect to every other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CartRepository, CatalogRepository, OrderRepository};
use crate::error::{CommerceError, CommerceResult};
use crate::models::{
    Cart, Category, CheckoutPlan, Order, Placement, Product, ProductFilter, ProductPage,
    StatusChange,
};

#[derive(Default)]
struct Tables {
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    /// Keyed by user id
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
}

/// Catalog, cart and order store kept in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    orders
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn insert_category(&self, category: &Category) -> CommerceResult<()> {
        let mut tables = self.tables.lock().await;
        let taken = tables
            .categories
            .values()
            .any(|c| c.name == category.name || c.slug == category.slug);
        if taken {
            return Err(CommerceError::DuplicateCategory);
        }
        tables.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn list_categories(&self) -> CommerceResult<Vec<Category>> {
        let tables = self.tables.lock().await;
        let mut categories: Vec<Category> = tables.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn find_category(&self, id: Uuid) -> CommerceResult<Option<Category>> {
        Ok(self.tables.lock().await.categories.get(&id).cloned())
    }

    async fn insert_product(&self, product: &Product) -> CommerceResult<()> {
        self.tables
            .lock()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product_details(&self, product: &Product) -> CommerceResult<bool> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.products.get_mut(&product.id) {
            Some(stored) => {
                stored.name = product.name.clone();
                stored.description = product.description.clone();
                stored.price = product.price;
                stored.image = product.image.clone();
                stored.category_id = product.category_id;
                stored.updated_at = product.updated_at;
                true
            }
            None => false,
        })
    }

    async fn find_product(&self, id: Uuid) -> CommerceResult<Option<Product>> {
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }

    async fn find_products(&self, ids: &[Uuid]) -> CommerceResult<Vec<Product>> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn list_products(&self, filter: &ProductFilter) -> CommerceResult<ProductPage> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<&Product> = tables
            .products
            .values()
            .filter(|p| filter.matches(p))
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .cloned()
            .collect();

        Ok(ProductPage {
            items,
            page: filter.page(),
            limit: filter.limit(),
            total,
        })
    }

    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> CommerceResult<Product> {
        if quantity < 1 {
            return Err(CommerceError::InvalidQuantity);
        }

        let mut tables = self.tables.lock().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or(CommerceError::ProductNotFound)?;
        if product.stock < quantity {
            return Err(CommerceError::insufficient_stock(product, quantity));
        }

        product.stock -= quantity;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn increment_stock(&self, id: Uuid, quantity: i32) -> CommerceResult<Product> {
        if quantity < 1 {
            return Err(CommerceError::InvalidQuantity);
        }

        let mut tables = self.tables.lock().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or(CommerceError::ProductNotFound)?;
        product.stock = product
            .stock
            .checked_add(quantity)
            .ok_or_else(|| CommerceError::Validation("stock would overflow".to_string()))?;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn record_rating(&self, id: Uuid, stars: u8) -> CommerceResult<Product> {
        let mut tables = self.tables.lock().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or(CommerceError::ProductNotFound)?;
        product.add_rating(stars);
        product.updated_at = Utc::now();
        Ok(product.clone())
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn load_or_create(&self, user_id: Uuid) -> CommerceResult<Cart> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .carts
            .entry(user_id)
            .or_insert_with(|| Cart::new(user_id))
            .clone())
    }

    async fn save(&self, cart: &Cart) -> CommerceResult<bool> {
        let mut tables = self.tables.lock().await;
        let Some(stored) = tables.carts.get_mut(&cart.user_id) else {
            return Ok(false);
        };
        if stored.id != cart.id || stored.version != cart.version {
            return Ok(false);
        }

        *stored = cart.clone();
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn place_order(&self, plan: &CheckoutPlan) -> CommerceResult<Placement> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        let order = &plan.order;

        for item in &order.items {
            let product = tables
                .products
                .get(&item.product_id)
                .ok_or(CommerceError::ProductNotFound)?;
            if product.stock < item.quantity {
                return Err(CommerceError::insufficient_stock(product, item.quantity));
            }
            if product.price != item.price {
                return Ok(Placement::Stale);
            }
        }

        let cart = match tables.carts.get_mut(&order.user_id) {
            Some(cart) if cart.id == plan.cart_id && cart.version == plan.cart_version => cart,
            _ => return Ok(Placement::Stale),
        };

        let now = Utc::now();
        for item in &order.items {
            if let Some(product) = tables.products.get_mut(&item.product_id) {
                product.stock -= item.quantity;
                product.updated_at = now;
            }
        }

        cart.clear();
        cart.version += 1;
        cart.updated_at = now;

        tables.orders.insert(order.id, order.clone());
        Ok(Placement::Placed(order.clone()))
    }

    async fn find_order(&self, id: Uuid) -> CommerceResult<Option<Order>> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> CommerceResult<Vec<Order>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(
            tables
                .orders
                .values()
                .filter(|o| o.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_orders(&self) -> CommerceResult<Vec<Order>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(tables.orders.values().cloned().collect()))
    }

    async fn transition(&self, id: Uuid, change: &StatusChange) -> CommerceResult<bool> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;

        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(false);
        };
        if order.status != change.from {
            return Ok(false);
        }

        if change.restock {
            for item in &order.items {
                if let Some(product) = tables.products.get_mut(&item.product_id) {
                    product.stock = product.stock.saturating_add(item.quantity);
                    product.updated_at = change.at;
                }
            }
        }

        order.apply_status(change);
        Ok(true)
    }

    async fn mark_paid(
        &self,
        id: Uuid,
        payment_result: &serde_json::Value,
        paid_at: DateTime<Utc>,
    ) -> CommerceResult<bool> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.orders.get_mut(&id) {
            Some(order) if !order.is_paid => {
                order.apply_payment(payment_result.clone(), paid_at);
                true
            }
            _ => false,
        })
    }
}
