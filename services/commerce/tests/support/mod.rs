//! Shared setup for the commerce integration suites

#![allow(dead_code)]

use commerce::models::{NewProduct, Product};
use commerce::{AccessGate, Caller, CatalogRepository, CheckoutConfig, Stores};
use identity::{IdentityService, JwtConfig, MemoryUserRepository, NewUser, TokenService};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub const SECRET: &str = "integration-test-secret";

pub struct Shop {
    pub gate: AccessGate,
    pub stores: Stores,
}

pub fn shop() -> Shop {
    let tokens = TokenService::new(&JwtConfig::with_secret(SECRET)).expect("token service");
    let identity = IdentityService::new(Arc::new(MemoryUserRepository::new()), tokens);
    let stores = Stores::memory();
    let gate = AccessGate::new(identity, stores.clone(), &CheckoutConfig::default());
    Shop { gate, stores }
}

impl Shop {
    pub async fn login(&self, email: &str, password: &str) -> Caller {
        let session = self.gate.login(email, password).await.expect("login");
        self.gate
            .authenticate(Some(&session.token))
            .await
            .expect("authenticate")
    }

    pub async fn customer(&self, name: &str, email: &str, password: &str) -> Caller {
        self.gate
            .register(NewUser::new(name, email, password))
            .await
            .expect("register");
        self.login(email, password).await
    }

    pub async fn admin(&self) -> Caller {
        self.gate
            .identity()
            .register_admin(NewUser::new("Root", "root@x.com", "rootpass1"))
            .await
            .expect("register admin");
        self.login("root@x.com", "rootpass1").await
    }

    pub async fn product(&self, admin: &Caller, name: &str, cents: i64, stock: i32) -> Product {
        self.gate
            .create_product(
                admin,
                NewProduct {
                    name: name.to_string(),
                    description: format!("{name} description"),
                    price: Decimal::new(cents, 2),
                    image: None,
                    stock,
                    category_id: None,
                },
            )
            .await
            .expect("create product")
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        self.stores
            .catalog
            .find_product(product_id)
            .await
            .expect("find product")
            .expect("product exists")
            .stock
    }
}
