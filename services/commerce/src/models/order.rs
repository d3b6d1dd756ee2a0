use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{line_total, sum_amounts};
use crate::error::{CommerceError, CommerceResult};

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Whether `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CommerceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Processing" => Ok(OrderStatus::Processing),
            "Shipped" => Ok(OrderStatus::Shipped),
            "Delivered" => Ok(OrderStatus::Delivered),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(CommerceError::Validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

/// Snapshot of one purchased line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> CommerceResult<Decimal> {
        line_total(self.price, self.quantity)
    }
}

/// A placed order. Items and total never change after placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub payment_method: String,
    pub payment_result: Option<serde_json::Value>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A fresh pending, unpaid order
    pub fn new(
        user_id: Uuid,
        items: Vec<OrderItem>,
        payment_method: String,
    ) -> CommerceResult<Self> {
        let now = Utc::now();
        let total_amount = sum_amounts(items.iter().map(OrderItem::line_total))?;
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            items,
            payment_method,
            payment_result: None,
            total_amount,
            status: OrderStatus::Pending,
            is_paid: false,
            paid_at: None,
            is_delivered: false,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_status(&mut self, change: &StatusChange) {
        self.status = change.to;
        self.updated_at = change.at;
        if change.to == OrderStatus::Delivered {
            self.is_delivered = true;
            self.delivered_at = Some(change.at);
        }
    }

    pub fn apply_payment(&mut self, payment_result: serde_json::Value, paid_at: DateTime<Utc>) {
        self.is_paid = true;
        self.paid_at = Some(paid_at);
        self.payment_result = Some(payment_result);
        self.updated_at = paid_at;
    }
}

/// A status move guarded on the current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    /// Return every item's quantity to stock in the same step
    pub restock: bool,
}

impl StatusChange {
    pub fn new(from: OrderStatus, to: OrderStatus) -> Self {
        Self {
            from,
            to,
            at: Utc::now(),
            restock: to == OrderStatus::Cancelled,
        }
    }
}

/// Everything the store needs to place an order atomically.
///
/// Item prices are the ones the order was priced with; the store rejects the
/// plan as stale if the catalog or the cart moved since.
#[derive(Debug, Clone)]
pub struct CheckoutPlan {
    pub order: Order,
    pub cart_id: Uuid,
    pub cart_version: i64,
}

/// Outcome of an atomic placement attempt
#[derive(Debug, Clone)]
pub enum Placement {
    Placed(Order),
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    const ALL: [OrderStatus; 5] = [Pending, Processing, Shipped, Delivered, Cancelled];

    #[test]
    fn test_forward_path() {
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Shipped.can_transition_to(Processing));
    }

    #[test]
    fn test_cancel_only_before_shipping() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for status in ALL.iter().filter(|s| s.is_terminal()) {
            for next in ALL {
                assert!(!status.can_transition_to(next), "{status} -> {next}");
            }
        }
    }

    #[test]
    fn test_no_self_transition() {
        for status in ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_new_order_totals_items() {
        let order = Order::new(
            Uuid::new_v4(),
            vec![
                OrderItem {
                    product_id: Uuid::new_v4(),
                    name: "P1".to_string(),
                    quantity: 3,
                    price: Decimal::new(1000, 2),
                },
                OrderItem {
                    product_id: Uuid::new_v4(),
                    name: "P2".to_string(),
                    quantity: 1,
                    price: Decimal::new(250, 2),
                },
            ],
            "card".to_string(),
        )
        .unwrap();

        assert_eq!(order.total_amount, Decimal::new(3250, 2));
        assert_eq!(order.status, Pending);
        assert!(!order.is_paid);
    }

    #[test]
    fn test_delivery_sets_delivered_fields() {
        let mut order = Order::new(Uuid::new_v4(), Vec::new(), "card".to_string()).unwrap();
        let change = StatusChange::new(Shipped, Delivered);
        order.apply_status(&change);

        assert!(order.is_delivered);
        assert_eq!(order.delivered_at, Some(change.at));
        assert!(!change.restock);
        assert!(StatusChange::new(Pending, Cancelled).restock);
    }
}
