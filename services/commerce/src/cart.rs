//! Cart engine
//!
//! Each mutation loads the cart, applies the change to the in-memory value,
//! prices it against the live catalog and saves it with a compare-and-swap on
//! the cart version. A lost race reloads and reapplies the change.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{CommerceError, CommerceResult};
use crate::models::{Cart, CartView, Product};
use crate::repositories::{CartRepository, CatalogRepository};

/// Attempts per cart mutation before giving up with `Conflict`
pub const DEFAULT_CART_ATTEMPTS: u32 = 5;

/// Cart engine
#[derive(Clone)]
pub struct CartEngine {
    carts: Arc<dyn CartRepository>,
    catalog: Arc<dyn CatalogRepository>,
    max_attempts: u32,
}

impl CartEngine {
    pub fn new(carts: Arc<dyn CartRepository>, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            carts,
            catalog,
            max_attempts: DEFAULT_CART_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Add units of a product, merging with an existing line
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> CommerceResult<CartView> {
        if quantity < 1 {
            return Err(CommerceError::InvalidQuantity);
        }
        let product = self.product(product_id).await?;

        self.mutate(user_id, |cart| {
            cart.add(product_id, quantity, product.price)?;
            Ok(true)
        })
        .await
    }

    /// Set a line's quantity. Zero removes it.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> CommerceResult<CartView> {
        if quantity < 0 {
            return Err(CommerceError::InvalidQuantity);
        }
        if quantity == 0 {
            return self.remove_item(user_id, product_id).await;
        }
        let product = self.product(product_id).await?;

        self.mutate(user_id, |cart| {
            if cart.quantity_of(product_id) == Some(quantity) {
                return Ok(false);
            }
            cart.set_quantity(product_id, quantity, product.price)?;
            Ok(true)
        })
        .await
    }

    /// Remove a line if present
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> CommerceResult<CartView> {
        self.mutate(user_id, |cart| Ok(cart.remove(product_id))).await
    }

    /// The cart priced against current catalog prices
    pub async fn get_cart(&self, user_id: Uuid) -> CommerceResult<CartView> {
        self.mutate(user_id, |_| Ok(false)).await
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> CommerceResult<CartView> {
        self.mutate(user_id, |cart| {
            let had_items = !cart.is_empty();
            cart.clear();
            Ok(had_items)
        })
        .await
    }

    async fn product(&self, id: Uuid) -> CommerceResult<Product> {
        self.catalog
            .find_product(id)
            .await?
            .ok_or(CommerceError::ProductNotFound)
    }

    async fn live_products(&self, cart: &Cart) -> CommerceResult<HashMap<Uuid, Product>> {
        if cart.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .catalog
            .find_products(&cart.product_ids())
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect())
    }

    /// Load, apply, reprice and save.
    ///
    /// `apply` reports whether it changed the lines. Nothing is written when the
    /// lines are unchanged and the stored total already matches live prices.
    async fn mutate<F>(&self, user_id: Uuid, mut apply: F) -> CommerceResult<CartView>
    where
        F: FnMut(&mut Cart) -> CommerceResult<bool> + Send,
    {
        for attempt in 1..=self.max_attempts {
            let mut cart = self.carts.load_or_create(user_id).await?;
            let changed = apply(&mut cart)?;

            let products = self.live_products(&cart).await?;
            let total = cart.live_total(&products)?;
            if !changed && total == cart.total_price {
                return CartView::new(&cart, &products);
            }

            cart.total_price = total;
            if self.carts.save(&cart).await? {
                cart.version += 1;
                return CartView::new(&cart, &products);
            }

            debug!(%user_id, attempt, "Cart changed concurrently, retrying");
        }

        Err(CommerceError::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewProduct;
    use crate::repositories::MemoryStore;
    use rust_decimal::Decimal;

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: CartEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let engine = CartEngine::new(store.clone(), store.clone());
        Fixture { store, engine }
    }

    async fn product(store: &MemoryStore, price: i64, stock: i32) -> Product {
        let product = Product::new(NewProduct {
            name: format!("P{price}"),
            description: String::new(),
            price: Decimal::new(price, 2),
            image: None,
            stock,
            category_id: None,
        });
        store.insert_product(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn test_add_item_totals_from_live_prices() {
        let Fixture { store, engine } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, 1000, 5).await;

        let cart = engine.add_item(user, p1.id, 3).await.unwrap();
        assert_eq!(cart.total_price, Decimal::new(3000, 2));
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_add_item_errors() {
        let Fixture { store, engine } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, 1000, 5).await;

        assert!(matches!(
            engine.add_item(user, p1.id, 0).await,
            Err(CommerceError::InvalidQuantity)
        ));
        assert!(matches!(
            engine.add_item(user, Uuid::new_v4(), 1).await,
            Err(CommerceError::ProductNotFound)
        ));
        assert!(engine.get_cart(user).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_update_item_sets_removes_and_creates() {
        let Fixture { store, engine } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, 1000, 5).await;
        let p2 = product(&store, 250, 5).await;

        engine.add_item(user, p1.id, 3).await.unwrap();

        let cart = engine.update_item(user, p1.id, 1).await.unwrap();
        assert_eq!(cart.total_price, Decimal::new(1000, 2));

        let cart = engine.update_item(user, p2.id, 2).await.unwrap();
        assert_eq!(cart.total_price, Decimal::new(1500, 2));

        let cart = engine.update_item(user, p1.id, 0).await.unwrap();
        assert_eq!(cart.total_price, Decimal::new(500, 2));

        assert!(matches!(
            engine.update_item(user, p2.id, -1).await,
            Err(CommerceError::InvalidQuantity)
        ));
    }

    #[tokio::test]
    async fn test_remove_item_is_idempotent() {
        let Fixture { store, engine } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, 1000, 5).await;
        engine.add_item(user, p1.id, 1).await.unwrap();

        let first = engine.remove_item(user, p1.id).await.unwrap();
        let second = engine.remove_item(user, p1.id).await.unwrap();
        assert!(first.items.is_empty());
        assert!(second.items.is_empty());
        assert_eq!(second.total_price, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_get_cart_persists_repriced_total() {
        let Fixture { store, engine } = fixture();
        let user = Uuid::new_v4();
        let mut p1 = product(&store, 1000, 5).await;
        engine.add_item(user, p1.id, 2).await.unwrap();

        p1.price = Decimal::new(1200, 2);
        store.update_product_details(&p1).await.unwrap();

        let cart = engine.get_cart(user).await.unwrap();
        assert_eq!(cart.total_price, Decimal::new(2400, 2));
        assert_eq!(cart.items[0].unit_price, Decimal::new(1200, 2));
        assert_eq!(cart.items[0].added_price, Decimal::new(1000, 2));

        let stored = store.load_or_create(user).await.unwrap();
        assert_eq!(stored.total_price, Decimal::new(2400, 2));
    }

    #[tokio::test]
    async fn test_clear_empties_cart() {
        let Fixture { store, engine } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, 1000, 5).await;
        engine.add_item(user, p1.id, 2).await.unwrap();

        let cart = engine.clear(user).await.unwrap();
        assert!(cart.items.is_empty());
        assert!(store.load_or_create(user).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_not_lost() {
        let Fixture { store, engine } = fixture();
        let user = Uuid::new_v4();
        let p1 = product(&store, 100, 100).await;
        let engine = engine.with_max_attempts(50);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let product_id = p1.id;
            handles.push(tokio::spawn(async move {
                engine.add_item(user, product_id, 1).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let cart = engine.get_cart(user).await.unwrap();
        assert_eq!(cart.items[0].quantity, 8);
        assert_eq!(cart.total_price, Decimal::new(800, 2));
    }
}
