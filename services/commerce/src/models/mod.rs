pub mod cart;
pub mod catalog;
pub mod order;

use rust_decimal::Decimal;

use crate::error::{CommerceError, CommerceResult};

pub use cart::{Cart, CartItem, CartLine, CartView};
pub use catalog::{
    Category, NewCategory, NewProduct, Product, ProductFilter, ProductPage, ProductUpdate, slugify,
};
pub use order::{CheckoutPlan, Order, OrderItem, OrderStatus, Placement, StatusChange};

/// Highest unit price a product may carry, matching the `NUMERIC(12,2)` columns
pub const MAX_PRICE: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// `price * quantity`, failing instead of overflowing
pub fn line_total(price: Decimal, quantity: i32) -> CommerceResult<Decimal> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(amount_overflow)
}

/// Sum of line totals, failing instead of overflowing
pub fn sum_amounts<I>(amounts: I) -> CommerceResult<Decimal>
where
    I: IntoIterator<Item = CommerceResult<Decimal>>,
{
    amounts.into_iter().try_fold(Decimal::ZERO, |total, amount| {
        total.checked_add(amount?).ok_or_else(amount_overflow)
    })
}

fn amount_overflow() -> CommerceError {
    CommerceError::Validation("amount exceeds the supported range".to_string())
}
