//! Order engine
//!
//! Checkout re-prices the cart against the live catalog, checks stock, and
//! hands a [`CheckoutPlan`] to the store, which applies it atomically or
//! reports it stale. Status changes are compare-and-swap on the current status.

use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{CommerceError, CommerceResult};
use crate::models::{
    CheckoutPlan, Order, OrderItem, OrderStatus, Placement, Product, StatusChange,
};
use crate::repositories::{CartRepository, CatalogRepository, OrderRepository};

/// Checkout configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    /// Attempts before a contended checkout fails with `Conflict`
    pub max_attempts: u32,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Order engine
#[derive(Clone)]
pub struct OrderEngine {
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartRepository>,
    catalog: Arc<dyn CatalogRepository>,
    max_attempts: u32,
}

impl OrderEngine {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartRepository>,
        catalog: Arc<dyn CatalogRepository>,
        config: &CheckoutConfig,
    ) -> Self {
        Self {
            orders,
            carts,
            catalog,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Turn the user's cart into a pending, unpaid order.
    #[instrument(skip(self, payment_method))]
    pub async fn checkout(&self, user_id: Uuid, payment_method: &str) -> CommerceResult<Order> {
        let payment_method = payment_method.trim();
        if payment_method.is_empty() {
            return Err(CommerceError::Validation(
                "payment method is required".to_string(),
            ));
        }

        for attempt in 1..=self.max_attempts {
            let cart = self.carts.load_or_create(user_id).await?;
            if cart.is_empty() {
                return Err(CommerceError::EmptyCart);
            }

            let products: HashMap<Uuid, Product> = self
                .catalog
                .find_products(&cart.product_ids())
                .await?
                .into_iter()
                .map(|product| (product.id, product))
                .collect();

            let mut items = Vec::with_capacity(cart.items.len());
            for line in &cart.items {
                let product = products
                    .get(&line.product_id)
                    .ok_or(CommerceError::ProductNotFound)?;
                if line.quantity > product.stock {
                    return Err(CommerceError::insufficient_stock(product, line.quantity));
                }
                items.push(OrderItem {
                    product_id: product.id,
                    name: product.name.clone(),
                    quantity: line.quantity,
                    price: product.price,
                });
            }

            let plan = CheckoutPlan {
                order: Order::new(user_id, items, payment_method.to_string())?,
                cart_id: cart.id,
                cart_version: cart.version,
            };

            match self.orders.place_order(&plan).await? {
                Placement::Placed(order) => {
                    info!(
                        order_id = %order.id,
                        total = %order.total_amount,
                        items = order.items.len(),
                        "Order placed"
                    );
                    return Ok(order);
                }
                Placement::Stale => {
                    debug!(%user_id, attempt, "Checkout plan went stale, retrying");
                }
            }
        }

        Err(CommerceError::Conflict)
    }

    /// Record a payment. Fails if the order is missing or already paid.
    #[instrument(skip(self, payment_result))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        payment_result: serde_json::Value,
    ) -> CommerceResult<Order> {
        let paid_at = Utc::now();
        if self
            .orders
            .mark_paid(order_id, &payment_result, paid_at)
            .await?
        {
            info!(%order_id, "Order paid");
            return self.get_order(order_id).await;
        }

        match self.orders.find_order(order_id).await? {
            Some(_) => Err(CommerceError::AlreadyPaid),
            None => Err(CommerceError::OrderNotFound),
        }
    }

    /// Move an order along its lifecycle. A target of `Cancelled` restores
    /// stock like [`OrderEngine::cancel`].
    #[instrument(skip(self))]
    pub async fn advance_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> CommerceResult<Order> {
        for attempt in 1..=self.max_attempts {
            let mut order = self.get_order(order_id).await?;
            if !order.status.can_transition_to(target) {
                return Err(CommerceError::InvalidTransition {
                    from: order.status,
                    to: target,
                });
            }

            let change = StatusChange::new(order.status, target);
            if self.orders.transition(order_id, &change).await? {
                order.apply_status(&change);
                info!(%order_id, from = %change.from, to = %change.to, "Order status changed");
                return Ok(order);
            }

            debug!(%order_id, attempt, "Order status moved concurrently, retrying");
        }

        Err(CommerceError::Conflict)
    }

    /// Cancel a pending or processing order and put its items back in stock
    pub async fn cancel(&self, order_id: Uuid) -> CommerceResult<Order> {
        self.advance_status(order_id, OrderStatus::Cancelled).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> CommerceResult<Order> {
        self.orders
            .find_order(order_id)
            .await?
            .ok_or(CommerceError::OrderNotFound)
    }

    pub async fn list_orders_for_user(&self, user_id: Uuid) -> CommerceResult<Vec<Order>> {
        self.orders.list_orders_for_user(user_id).await
    }

    pub async fn list_orders(&self) -> CommerceResult<Vec<Order>> {
        self.orders.list_orders().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartEngine;
    use crate::models::NewProduct;
    use crate::repositories::MemoryStore;
    use rust_decimal::Decimal;

    struct Fixture {
        store: Arc<MemoryStore>,
        carts: CartEngine,
        orders: OrderEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            carts: CartEngine::new(store.clone(), store.clone()),
            orders: OrderEngine::new(
                store.clone(),
                store.clone(),
                store.clone(),
                &CheckoutConfig::default(),
            ),
            store,
        }
    }

    async fn product(store: &MemoryStore, name: &str, price: i64, stock: i32) -> Product {
        let product = Product::new(NewProduct {
            name: name.to_string(),
            description: String::new(),
            price: Decimal::new(price, 2),
            image: None,
            stock,
            category_id: None,
        });
        store.insert_product(&product).await.unwrap();
        product
    }

    async fn stock_of(store: &MemoryStore, id: Uuid) -> i32 {
        store.find_product(id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn test_checkout_snapshots_cart() {
        let Fixture { store, carts, orders } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, "P1", 1000, 5).await;
        carts.add_item(user, p1.id, 3).await.unwrap();

        let order = orders.checkout(user, "card").await.unwrap();

        assert_eq!(order.total_amount, Decimal::new(3000, 2));
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.is_paid);
        assert_eq!(order.items[0].name, "P1");
        assert_eq!(stock_of(&store, p1.id).await, 2);
        assert!(carts.get_cart(user).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_rejects_empty_cart_and_blank_method() {
        let Fixture { store, carts, orders } = fixture();
        let user = Uuid::new_v4();

        assert!(matches!(
            orders.checkout(user, "card").await,
            Err(CommerceError::EmptyCart)
        ));

        let p1 = product(&store, "P1", 1000, 5).await;
        carts.add_item(user, p1.id, 1).await.unwrap();
        assert!(matches!(
            orders.checkout(user, "   ").await,
            Err(CommerceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_checkout_insufficient_stock_writes_nothing() {
        let Fixture { store, carts, orders } = fixture();
        let user = Uuid::new_v4();
        let plenty = product(&store, "Plenty", 500, 10).await;
        let scarce = product(&store, "Scarce", 700, 1).await;
        carts.add_item(user, plenty.id, 2).await.unwrap();
        carts.add_item(user, scarce.id, 2).await.unwrap();

        let err = orders.checkout(user, "card").await.unwrap_err();
        match err {
            CommerceError::InsufficientStock {
                product_id,
                requested,
                available,
                ..
            } => {
                assert_eq!(product_id, scarce.id);
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(stock_of(&store, plenty.id).await, 10);
        assert_eq!(stock_of(&store, scarce.id).await, 1);
        assert_eq!(carts.get_cart(user).await.unwrap().items.len(), 2);
        assert!(orders.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_uses_live_price() {
        let Fixture { store, carts, orders } = fixture();
        let user = Uuid::new_v4();
        let mut p1 = product(&store, "P1", 1000, 5).await;
        carts.add_item(user, p1.id, 2).await.unwrap();

        p1.price = Decimal::new(800, 2);
        store.update_product_details(&p1).await.unwrap();

        let order = orders.checkout(user, "card").await.unwrap();
        assert_eq!(order.items[0].price, Decimal::new(800, 2));
        assert_eq!(order.total_amount, Decimal::new(1600, 2));
    }

    #[tokio::test]
    async fn test_confirm_payment_once() {
        let Fixture { store, carts, orders } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, "P1", 1000, 5).await;
        carts.add_item(user, p1.id, 1).await.unwrap();
        let order = orders.checkout(user, "card").await.unwrap();

        let payload = serde_json::json!({ "id": "pay_42", "status": "COMPLETED" });
        let paid = orders.confirm_payment(order.id, payload.clone()).await.unwrap();
        assert!(paid.is_paid);
        assert!(paid.paid_at.is_some());
        assert_eq!(paid.payment_result, Some(payload.clone()));

        assert!(matches!(
            orders.confirm_payment(order.id, payload.clone()).await,
            Err(CommerceError::AlreadyPaid)
        ));
        assert!(matches!(
            orders.confirm_payment(Uuid::new_v4(), payload).await,
            Err(CommerceError::OrderNotFound)
        ));
    }

    #[tokio::test]
    async fn test_status_walks_forward_to_delivered() {
        let Fixture { store, carts, orders } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, "P1", 1000, 5).await;
        carts.add_item(user, p1.id, 1).await.unwrap();
        let order = orders.checkout(user, "card").await.unwrap();

        assert!(matches!(
            orders.advance_status(order.id, OrderStatus::Shipped).await,
            Err(CommerceError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped
            })
        ));

        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            orders.advance_status(order.id, status).await.unwrap();
        }

        let delivered = orders.get_order(order.id).await.unwrap();
        assert!(delivered.is_delivered);
        assert!(delivered.delivered_at.is_some());

        assert!(matches!(
            orders.cancel(order.id).await,
            Err(CommerceError::InvalidTransition { .. })
        ));
        assert!(matches!(
            orders.advance_status(order.id, OrderStatus::Processing).await,
            Err(CommerceError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_processing_order_restores_stock() {
        let Fixture { store, carts, orders } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, "P1", 1000, 5).await;
        carts.add_item(user, p1.id, 2).await.unwrap();
        let order = orders.checkout(user, "card").await.unwrap();
        orders
            .advance_status(order.id, OrderStatus::Processing)
            .await
            .unwrap();
        assert_eq!(stock_of(&store, p1.id).await, 3);

        let cancelled = orders.cancel(order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&store, p1.id).await, 5);

        assert!(matches!(
            orders.cancel(order.id).await,
            Err(CommerceError::InvalidTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Cancelled
            })
        ));
        assert_eq!(stock_of(&store, p1.id).await, 5);
    }

    #[tokio::test]
    async fn test_advance_to_cancelled_restores_stock() {
        let Fixture { store, carts, orders } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, "P1", 1000, 5).await;
        carts.add_item(user, p1.id, 4).await.unwrap();
        let order = orders.checkout(user, "card").await.unwrap();

        orders
            .advance_status(order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(stock_of(&store, p1.id).await, 5);
    }

    #[tokio::test]
    async fn test_order_listing() {
        let Fixture { store, carts, orders } = fixture();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let p1 = product(&store, "P1", 1000, 10).await;

        for user in [alice, bob, alice] {
            carts.add_item(user, p1.id, 1).await.unwrap();
            orders.checkout(user, "card").await.unwrap();
        }

        assert_eq!(orders.list_orders_for_user(alice).await.unwrap().len(), 2);
        assert_eq!(orders.list_orders_for_user(bob).await.unwrap().len(), 1);
        assert_eq!(orders.list_orders().await.unwrap().len(), 3);
        assert!(matches!(
            orders.get_order(Uuid::new_v4()).await,
            Err(CommerceError::OrderNotFound)
        ));
    }
}
