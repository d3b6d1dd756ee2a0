use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::{Product, line_total, sum_amounts};
use crate::error::{CommerceError, CommerceResult};

/// A cart line. `price` is the unit price captured when the line was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

/// A user's cart as stored.
///
/// `version` is bumped by the store on every successful save and is what
/// concurrent writers compare against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub total_price: Decimal,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            items: Vec::new(),
            total_price: Decimal::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn quantity_of(&self, product_id: Uuid) -> Option<i32> {
        self.items
            .iter()
            .find(|item| item.product_id == product_id)
            .map(|item| item.quantity)
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|item| item.product_id).collect()
    }

    /// Add `quantity` units, merging into an existing line.
    pub fn add(&mut self, product_id: Uuid, quantity: i32, price: Decimal) -> CommerceResult<()> {
        if quantity < 1 {
            return Err(CommerceError::InvalidQuantity);
        }

        match self.items.iter_mut().find(|item| item.product_id == product_id) {
            Some(item) => {
                item.quantity = item
                    .quantity
                    .checked_add(quantity)
                    .ok_or(CommerceError::InvalidQuantity)?;
                item.price = price;
            }
            None => self.items.push(CartItem {
                product_id,
                quantity,
                price,
            }),
        }
        Ok(())
    }

    /// Set a line's quantity. Zero removes the line, a missing line is created.
    pub fn set_quantity(
        &mut self,
        product_id: Uuid,
        quantity: i32,
        price: Decimal,
    ) -> CommerceResult<()> {
        if quantity < 0 {
            return Err(CommerceError::InvalidQuantity);
        }
        if quantity == 0 {
            self.remove(product_id);
            return Ok(());
        }

        match self.items.iter_mut().find(|item| item.product_id == product_id) {
            Some(item) => item.quantity = quantity,
            None => self.items.push(CartItem {
                product_id,
                quantity,
                price,
            }),
        }
        Ok(())
    }

    /// Remove a line. Returns whether anything was removed.
    pub fn remove(&mut self, product_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.product_id != product_id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.total_price = Decimal::ZERO;
    }

    /// Sum of quantity times the current unit price. Lines whose product is
    /// gone contribute nothing.
    pub fn live_total(&self, products: &HashMap<Uuid, Product>) -> CommerceResult<Decimal> {
        sum_amounts(self.items.iter().filter_map(|item| {
            products
                .get(&item.product_id)
                .map(|product| line_total(product.price, item.quantity))
        }))
    }
}

/// A cart line priced against the live catalog
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub added_price: Decimal,
    pub line_total: Decimal,
}

/// What callers see of a cart
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    pub total_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl CartView {
    pub fn new(cart: &Cart, products: &HashMap<Uuid, Product>) -> CommerceResult<Self> {
        let items = cart
            .items
            .iter()
            .filter_map(|item| {
                products.get(&item.product_id).map(|product| {
                    Ok(CartLine {
                        product_id: item.product_id,
                        name: product.name.clone(),
                        image: product.image.clone(),
                        quantity: item.quantity,
                        unit_price: product.price,
                        added_price: item.price,
                        line_total: line_total(product.price, item.quantity)?,
                    })
                })
            })
            .collect::<CommerceResult<Vec<_>>>()?;

        Ok(Self {
            id: cart.id,
            user_id: cart.user_id,
            items,
            total_price: cart.live_total(products)?,
            updated_at: cart.updated_at,
        })
    }
}
