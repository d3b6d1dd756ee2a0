//! PostgreSQL commerce store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::DatabaseError;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::{CartRepository, CatalogRepository, OrderRepository};
use crate::error::{CommerceError, CommerceResult};
use crate::models::{
    Cart, CartItem, Category, CheckoutPlan, Order, OrderItem, OrderStatus, Placement, Product,
    ProductFilter, ProductPage, StatusChange,
};

#[derive(FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Uuid,
    total_price: rust_decimal::Decimal,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CartItemRow {
    product_id: Uuid,
    quantity: i32,
    price: rust_decimal::Decimal,
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    payment_method: String,
    payment_result: Option<serde_json::Value>,
    total_amount: rust_decimal::Decimal,
    status: String,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OrderItemRow {
    order_id: Uuid,
    product_id: Uuid,
    name: String,
    quantity: i32,
    price: rust_decimal::Decimal,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> CommerceResult<Order> {
        let status = self.status.parse::<OrderStatus>().map_err(|_| {
            DatabaseError::CorruptRow {
                table: "orders",
                detail: format!("unknown status {:?}", self.status),
            }
        })?;

        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            items,
            payment_method: self.payment_method,
            payment_result: self.payment_result,
            total_amount: self.total_amount,
            status,
            is_paid: self.is_paid,
            paid_at: self.paid_at,
            is_delivered: self.is_delivered,
            delivered_at: self.delivered_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Catalog, cart and order store on PostgreSQL
#[derive(Clone)]
pub struct PgCommerceStore {
    pool: PgPool,
}

impl PgCommerceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach items to order rows, keeping row order
    async fn hydrate_orders(&self, rows: Vec<OrderRow>) -> CommerceResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT order_id, product_id, name, quantity, price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items.entry(row.order_id).or_default().push(OrderItem {
                product_id: row.product_id,
                name: row.name,
                quantity: row.quantity,
                price: row.price,
            });
        }

        rows.into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect()
    }

    async fn current_product(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> CommerceResult<Option<Product>> {
        Ok(sqlx::query_as::<_, Product>(
            r#"
            SELECT id, category_id, name, description, price, image, stock, rating,
                   num_reviews, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?)
    }
}

#[async_trait]
impl CatalogRepository for PgCommerceStore {
    async fn insert_category(&self, category: &Category) -> CommerceResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO categories (id, name, slug, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Query);

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_unique_violation() => Err(CommerceError::DuplicateCategory),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_categories(&self) -> CommerceResult<Vec<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, name, slug, description, created_at, updated_at FROM categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_category(&self, id: Uuid) -> CommerceResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, name, slug, description, created_at, updated_at FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_product(&self, product: &Product) -> CommerceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, category_id, name, description, price, image, stock,
                                  rating, num_reviews, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(product.id)
        .bind(product.category_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.image)
        .bind(product.stock)
        .bind(product.rating)
        .bind(product.num_reviews)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_product_details(&self, product: &Product) -> CommerceResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, price = $4, image = $5, category_id = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.image)
        .bind(product.category_id)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_product(&self, id: Uuid) -> CommerceResult<Option<Product>> {
        Ok(sqlx::query_as::<_, Product>(
            r#"
            SELECT id, category_id, name, description, price, image, stock, rating,
                   num_reviews, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_products(&self, ids: &[Uuid]) -> CommerceResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(sqlx::query_as::<_, Product>(
            r#"
            SELECT id, category_id, name, description, price, image, stock, rating,
                   num_reviews, created_at, updated_at
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_products(&self, filter: &ProductFilter) -> CommerceResult<ProductPage> {
        let search = filter.search_term();
        let limit = i64::from(filter.limit());
        let offset = i64::try_from(filter.offset())
            .map_err(|_| CommerceError::Validation("page out of range".to_string()))?;

        let items = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, category_id, name, description, price, image, stock, rating,
                   num_reviews, created_at, updated_at
            FROM products
            WHERE ($1::uuid IS NULL OR category_id = $1)
              AND ($2::text IS NULL OR position($2 IN lower(name)) > 0)
              AND ($3::numeric IS NULL OR price >= $3)
              AND ($4::numeric IS NULL OR price <= $4)
              AND (NOT $5 OR stock > 0)
            ORDER BY name, id
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.category_id)
        .bind(&search)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(filter.in_stock)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM products
            WHERE ($1::uuid IS NULL OR category_id = $1)
              AND ($2::text IS NULL OR position($2 IN lower(name)) > 0)
              AND ($3::numeric IS NULL OR price >= $3)
              AND ($4::numeric IS NULL OR price <= $4)
              AND (NOT $5 OR stock > 0)
            "#,
        )
        .bind(filter.category_id)
        .bind(&search)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(filter.in_stock)
        .fetch_one(&self.pool)
        .await?;

        Ok(ProductPage {
            items,
            page: filter.page(),
            limit: filter.limit(),
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn decrement_stock(&self, id: Uuid, quantity: i32) -> CommerceResult<Product> {
        if quantity < 1 {
            return Err(CommerceError::InvalidQuantity);
        }

        let updated = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = now()
            WHERE id = $1 AND stock >= $2
            RETURNING id, category_id, name, description, price, image, stock, rating,
                      num_reviews, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(product) => Ok(product),
            None => match self.find_product(id).await? {
                Some(product) => Err(CommerceError::insufficient_stock(&product, quantity)),
                None => Err(CommerceError::ProductNotFound),
            },
        }
    }

    async fn increment_stock(&self, id: Uuid, quantity: i32) -> CommerceResult<Product> {
        if quantity < 1 {
            return Err(CommerceError::InvalidQuantity);
        }

        sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = now()
            WHERE id = $1
            RETURNING id, category_id, name, description, price, image, stock, rating,
                      num_reviews, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CommerceError::ProductNotFound)
    }

    async fn record_rating(&self, id: Uuid, stars: u8) -> CommerceResult<Product> {
        sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET rating = (rating * num_reviews + $2) / (num_reviews + 1),
                num_reviews = num_reviews + 1,
                updated_at = now()
            WHERE id = $1
            RETURNING id, category_id, name, description, price, image, stock, rating,
                      num_reviews, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(f64::from(stars))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CommerceError::ProductNotFound)
    }
}

#[async_trait]
impl CartRepository for PgCommerceStore {
    async fn load_or_create(&self, user_id: Uuid) -> CommerceResult<Cart> {
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, total_price, version, created_at, updated_at)
            VALUES ($1, $2, 0, 0, now(), now())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, CartRow>(
            r#"
            SELECT id, user_id, total_price, version, created_at, updated_at
            FROM carts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, CartItemRow>(
            "SELECT product_id, quantity, price FROM cart_items WHERE cart_id = $1 ORDER BY position",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|item| CartItem {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        })
        .collect();

        Ok(Cart {
            id: row.id,
            user_id: row.user_id,
            items,
            total_price: row.total_price,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn save(&self, cart: &Cart) -> CommerceResult<bool> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE carts
            SET total_price = $3, version = version + 1, updated_at = now()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(cart.id)
        .bind(cart.version)
        .bind(cart.total_price)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id)
            .execute(&mut *tx)
            .await?;

        for (position, item) in (0_i32..).zip(&cart.items) {
            sqlx::query(
                r#"
                INSERT INTO cart_items (id, cart_id, product_id, quantity, price, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(cart.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl OrderRepository for PgCommerceStore {
    async fn place_order(&self, plan: &CheckoutPlan) -> CommerceResult<Placement> {
        let order = &plan.order;
        let mut lines: Vec<&OrderItem> = order.items.iter().collect();
        lines.sort_by_key(|item| item.product_id);

        let mut tx = self.pool.begin().await?;

        // Row locks are taken in product id order so concurrent checkouts
        // cannot deadlock each other.
        for item in lines {
            let taken = sqlx::query(
                r#"
                UPDATE products
                SET stock = stock - $2, updated_at = now()
                WHERE id = $1 AND stock >= $2 AND price = $3
                "#,
            )
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;

            if taken.rows_affected() == 0 {
                let current = Self::current_product(&mut tx, item.product_id).await?;
                tx.rollback().await?;
                return match current {
                    None => Err(CommerceError::ProductNotFound),
                    Some(product) if product.stock < item.quantity => {
                        Err(CommerceError::insufficient_stock(&product, item.quantity))
                    }
                    Some(_) => {
                        debug!(product_id = %item.product_id, "Price moved during checkout");
                        Ok(Placement::Stale)
                    }
                };
            }
        }

        let cleared = sqlx::query(
            r#"
            UPDATE carts
            SET total_price = 0, version = version + 1, updated_at = now()
            WHERE id = $1 AND user_id = $2 AND version = $3
            "#,
        )
        .bind(plan.cart_id)
        .bind(order.user_id)
        .bind(plan.cart_version)
        .execute(&mut *tx)
        .await?;

        if cleared.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(cart_id = %plan.cart_id, "Cart moved during checkout");
            return Ok(Placement::Stale);
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(plan.cart_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, payment_method, payment_result, total_amount, status,
                                is_paid, paid_at, is_delivered, delivered_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.payment_method)
        .bind(&order.payment_result)
        .bind(order.total_amount)
        .bind(order.status.as_str())
        .bind(order.is_paid)
        .bind(order.paid_at)
        .bind(order.is_delivered)
        .bind(order.delivered_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in (0_i32..).zip(&order.items) {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, name, quantity, price, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(item.product_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.price)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Placement::Placed(order.clone()))
    }

    async fn find_order(&self, id: Uuid) -> CommerceResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, user_id, payment_method, payment_result, total_amount, status, is_paid,
                   paid_at, is_delivered, delivered_at, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> CommerceResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, user_id, payment_method, payment_result, total_amount, status, is_paid,
                   paid_at, is_delivered, delivered_at, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_orders(rows).await
    }

    async fn list_orders(&self) -> CommerceResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, user_id, payment_method, payment_result, total_amount, status, is_paid,
                   paid_at, is_delivered, delivered_at, created_at, updated_at
            FROM orders
            ORDER BY created_at DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_orders(rows).await
    }

    async fn transition(&self, id: Uuid, change: &StatusChange) -> CommerceResult<bool> {
        let delivered = change.to == OrderStatus::Delivered;
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3,
                updated_at = $4,
                is_delivered = is_delivered OR $5,
                delivered_at = CASE WHEN $5 THEN $4 ELSE delivered_at END
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(change.at)
        .bind(delivered)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if change.restock {
            let items = sqlx::query_as::<_, (Uuid, i32)>(
                "SELECT product_id, quantity FROM order_items WHERE order_id = $1 ORDER BY product_id",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

            for (product_id, quantity) in items {
                sqlx::query("UPDATE products SET stock = stock + $2, updated_at = $3 WHERE id = $1")
                    .bind(product_id)
                    .bind(quantity)
                    .bind(change.at)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn mark_paid(
        &self,
        id: Uuid,
        payment_result: &serde_json::Value,
        paid_at: DateTime<Utc>,
    ) -> CommerceResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET is_paid = TRUE, paid_at = $2, payment_result = $3, updated_at = $2
            WHERE id = $1 AND NOT is_paid
            "#,
        )
        .bind(id)
        .bind(paid_at)
        .bind(payment_result)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
