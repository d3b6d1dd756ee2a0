//! End-to-end shopping flows through the access gate

mod support;

use commerce::CommerceError;
use commerce::models::{MAX_PRICE, OrderStatus};
use rust_decimal::Decimal;
use support::shop;

#[tokio::test]
async fn test_alice_buys_three_units() -> Result<(), Box<dyn std::error::Error>> {
    let shop = shop();
    let admin = shop.admin().await;
    let p1 = shop.product(&admin, "P1", 1000, 5).await;
    let alice = shop.customer("Alice", "alice@x.com", "pw123456").await;

    let cart = shop.gate.add_to_cart(&alice, p1.id, 3).await?;
    assert_eq!(cart.total_price, Decimal::new(3000, 2));

    let order = shop.gate.checkout(&alice, "card").await?;
    assert_eq!(order.total_amount, Decimal::new(3000, 2));
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(!order.is_paid);
    assert_eq!(order.payment_method, "card");
    assert_eq!(order.user_id, alice.user_id());

    assert_eq!(shop.stock_of(p1.id).await, 2);
    assert!(shop.gate.get_cart(&alice).await?.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cart_total_tracks_live_prices() -> Result<(), Box<dyn std::error::Error>> {
    let shop = shop();
    let admin = shop.admin().await;
    let p1 = shop.product(&admin, "P1", 1000, 50).await;
    let p2 = shop.product(&admin, "P2", 375, 50).await;
    let alice = shop.customer("Alice", "alice@x.com", "pw123456").await;

    shop.gate.add_to_cart(&alice, p1.id, 2).await?;
    shop.gate.add_to_cart(&alice, p2.id, 4).await?;
    shop.gate.add_to_cart(&alice, p1.id, 1).await?;
    shop.gate.update_cart_item(&alice, p2.id, 1).await?;
    shop.gate.remove_from_cart(&alice, p2.id).await?;
    shop.gate.update_cart_item(&alice, p2.id, 2).await?;

    shop.gate
        .update_product(
            &admin,
            p1.id,
            commerce::models::ProductUpdate {
                price: Some(Decimal::new(1250, 2)),
                ..Default::default()
            },
        )
        .await?;

    let cart = shop.gate.get_cart(&alice).await?;
    let expected: Decimal = cart
        .items
        .iter()
        .map(|line| line.unit_price * Decimal::from(line.quantity))
        .sum();
    assert_eq!(cart.total_price, expected);
    assert_eq!(cart.total_price, Decimal::new(3 * 1250 + 2 * 375, 2));
    Ok(())
}

#[tokio::test]
async fn test_checkout_conserves_stock() -> Result<(), Box<dyn std::error::Error>> {
    let shop = shop();
    let admin = shop.admin().await;
    let p1 = shop.product(&admin, "P1", 1000, 7).await;
    let p2 = shop.product(&admin, "P2", 200, 4).await;
    let alice = shop.customer("Alice", "alice@x.com", "pw123456").await;

    shop.gate.add_to_cart(&alice, p1.id, 5).await?;
    shop.gate.add_to_cart(&alice, p2.id, 4).await?;
    let order = shop.gate.checkout(&alice, "card").await?;

    for item in &order.items {
        let initial = if item.product_id == p1.id { 7 } else { 4 };
        assert_eq!(shop.stock_of(item.product_id).await + item.quantity, initial);
    }
    assert_eq!(shop.stock_of(p2.id).await, 0);
    Ok(())
}

#[tokio::test]
async fn test_insufficient_stock_is_all_or_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let shop = shop();
    let admin = shop.admin().await;
    let p1 = shop.product(&admin, "P1", 1000, 5).await;
    let p2 = shop.product(&admin, "P2", 500, 1).await;
    let alice = shop.customer("Alice", "alice@x.com", "pw123456").await;

    shop.gate.add_to_cart(&alice, p1.id, 2).await?;
    shop.gate.add_to_cart(&alice, p2.id, 3).await?;

    let err = shop.gate.checkout(&alice, "card").await.unwrap_err();
    assert!(matches!(
        err,
        CommerceError::InsufficientStock {
            requested: 3,
            available: 1,
            ..
        }
    ));

    assert_eq!(shop.stock_of(p1.id).await, 5);
    assert_eq!(shop.stock_of(p2.id).await, 1);
    assert_eq!(shop.gate.get_cart(&alice).await?.items.len(), 2);
    assert!(shop.gate.list_all_orders(&admin).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancel_processing_order_restores_stock() -> Result<(), Box<dyn std::error::Error>> {
    let shop = shop();
    let admin = shop.admin().await;
    let p1 = shop.product(&admin, "P1", 1000, 5).await;
    let alice = shop.customer("Alice", "alice@x.com", "pw123456").await;

    shop.gate.add_to_cart(&alice, p1.id, 2).await?;
    let order = shop.gate.checkout(&alice, "card").await?;
    shop.gate
        .advance_order_status(&admin, order.id, OrderStatus::Processing)
        .await?;
    assert_eq!(shop.stock_of(p1.id).await, 3);

    let cancelled = shop.gate.cancel_order(&alice, order.id).await?;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(shop.stock_of(p1.id).await, 5);

    let again = shop.gate.cancel_order(&alice, order.id).await;
    assert!(matches!(again, Err(CommerceError::InvalidTransition { .. })));
    assert_eq!(shop.stock_of(p1.id).await, 5);
    Ok(())
}

#[tokio::test]
async fn test_shipped_orders_cannot_be_cancelled() -> Result<(), Box<dyn std::error::Error>> {
    let shop = shop();
    let admin = shop.admin().await;
    let p1 = shop.product(&admin, "P1", 1000, 5).await;
    let alice = shop.customer("Alice", "alice@x.com", "pw123456").await;

    shop.gate.add_to_cart(&alice, p1.id, 1).await?;
    let order = shop.gate.checkout(&alice, "card").await?;
    for status in [OrderStatus::Processing, OrderStatus::Shipped] {
        shop.gate.advance_order_status(&admin, order.id, status).await?;
    }

    assert!(matches!(
        shop.gate.cancel_order(&alice, order.id).await,
        Err(CommerceError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled
        })
    ));

    let delivered = shop
        .gate
        .advance_order_status(&admin, order.id, OrderStatus::Delivered)
        .await?;
    assert!(delivered.is_delivered);
    assert_eq!(shop.stock_of(p1.id).await, 4);
    Ok(())
}

#[tokio::test]
async fn test_pay_then_view_order() -> Result<(), Box<dyn std::error::Error>> {
    let shop = shop();
    let admin = shop.admin().await;
    let p1 = shop.product(&admin, "P1", 1000, 5).await;
    let alice = shop.customer("Alice", "alice@x.com", "pw123456").await;

    shop.gate.add_to_cart(&alice, p1.id, 1).await?;
    let order = shop.gate.checkout(&alice, "paypal").await?;

    let receipt = serde_json::json!({ "id": "PAY-1", "email_address": "alice@x.com" });
    let paid = shop
        .gate
        .confirm_payment(&alice, order.id, receipt.clone())
        .await?;
    assert!(paid.is_paid);

    assert!(matches!(
        shop.gate.confirm_payment(&alice, order.id, receipt).await,
        Err(CommerceError::AlreadyPaid)
    ));

    let viewed = shop.gate.get_order(&admin, order.id).await?;
    assert!(viewed.is_paid);
    assert_eq!(shop.gate.list_orders_for_user(&alice, alice.user_id()).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_price_ceiling_keeps_totals_in_range() -> Result<(), Box<dyn std::error::Error>> {
    let shop = shop();
    let admin = shop.admin().await;
    let alice = shop.customer("Alice", "alice@x.com", "pw123456").await;

    let oversized = commerce::models::NewProduct {
        name: "Yacht".to_string(),
        description: String::new(),
        price: Decimal::from_scientific("1e28")?,
        image: None,
        stock: 100,
        category_id: None,
    };
    let err = shop.gate.create_product(&admin, oversized).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)));

    let yacht = shop.product(&admin, "Yacht", 999_999_999_999, 100).await;
    assert_eq!(yacht.price, MAX_PRICE);

    let cart = shop.gate.add_to_cart(&alice, yacht.id, 10).await?;
    assert_eq!(cart.total_price, MAX_PRICE * Decimal::from(10));

    let order = shop.gate.checkout(&alice, "card").await?;
    assert_eq!(order.total_amount, MAX_PRICE * Decimal::from(10));
    assert_eq!(shop.stock_of(yacht.id).await, 90);
    Ok(())
}
