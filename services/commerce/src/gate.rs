//! Access control gate
//!
//! Every operation a client can reach goes through [`AccessGate`]. Protected
//! operations take a [`Caller`], which only [`AccessGate::authenticate`] can
//! produce, and check a [`Permission`] against the caller's role and the
//! owner of the resource.

use identity::{AuthError, IdentityService, NewUser, Role, User};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::cart::CartEngine;
use crate::catalog::CatalogService;
use crate::error::{CommerceError, CommerceResult};
use crate::models::{
    CartView, Category, NewCategory, NewProduct, Order, OrderStatus, Product, ProductFilter,
    ProductPage, ProductUpdate,
};
use crate::orders::{CheckoutConfig, OrderEngine};
use crate::repositories::Stores;

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    user_id: Uuid,
    role: Role,
}

impl Caller {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Protected operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    RateProduct,
    UseCart,
    Checkout,
    ConfirmPayment,
    ChangePassword,
    ViewOrder,
    CancelOrder,
    ViewProfile,
    ListUserOrders,
    ManageCatalog,
    AdvanceOrderStatus,
    ListAllOrders,
    ListUsers,
    SetRole,
}

enum Rule {
    AnyCaller,
    OwnerOnly,
    OwnerOrAdmin,
    AdminOnly,
}

impl Permission {
    fn rule(self) -> Rule {
        match self {
            Permission::RateProduct => Rule::AnyCaller,
            Permission::UseCart
            | Permission::Checkout
            | Permission::ConfirmPayment
            | Permission::ChangePassword => Rule::OwnerOnly,
            Permission::ViewOrder
            | Permission::CancelOrder
            | Permission::ViewProfile
            | Permission::ListUserOrders => Rule::OwnerOrAdmin,
            Permission::ManageCatalog
            | Permission::AdvanceOrderStatus
            | Permission::ListAllOrders
            | Permission::ListUsers
            | Permission::SetRole => Rule::AdminOnly,
        }
    }

    /// Whether `caller` may perform this on a resource owned by `owner`
    pub fn allows(self, caller: &Caller, owner: Option<Uuid>) -> bool {
        let is_owner = owner == Some(caller.user_id);
        match (self.rule(), caller.role) {
            (Rule::AnyCaller, _) => true,
            (Rule::OwnerOnly, _) => is_owner,
            (Rule::OwnerOrAdmin, Role::Admin) => true,
            (Rule::OwnerOrAdmin, Role::Customer) => is_owner,
            (Rule::AdminOnly, Role::Admin) => true,
            (Rule::AdminOnly, Role::Customer) => false,
        }
    }
}

/// Result of a successful login
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: User,
}

/// Entry point for every client operation
#[derive(Clone)]
pub struct AccessGate {
    identity: IdentityService,
    catalog: CatalogService,
    carts: CartEngine,
    orders: OrderEngine,
}

impl AccessGate {
    pub fn new(identity: IdentityService, stores: Stores, checkout: &CheckoutConfig) -> Self {
        Self {
            identity,
            catalog: CatalogService::new(stores.catalog.clone()),
            carts: CartEngine::new(stores.carts.clone(), stores.catalog.clone()),
            orders: OrderEngine::new(stores.orders, stores.carts, stores.catalog, checkout),
        }
    }

    pub fn identity(&self) -> &IdentityService {
        &self.identity
    }

    /// Resolve a bearer token to a caller.
    ///
    /// The role comes from the stored user so a demotion takes effect before
    /// the token expires.
    pub async fn authenticate(&self, token: Option<&str>) -> CommerceResult<Caller> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(CommerceError::Unauthorized)?;

        let claims = self
            .identity
            .resolve_token(token)
            .map_err(|_| CommerceError::Unauthorized)?;

        let user = self.identity.get_user(claims.sub).await.map_err(|e| match e {
            AuthError::UserNotFound => CommerceError::UserNotFound,
            other => other.into(),
        })?;

        Ok(Caller {
            user_id: user.id,
            role: user.role,
        })
    }

    fn authorize(
        &self,
        caller: &Caller,
        permission: Permission,
        owner: Option<Uuid>,
    ) -> CommerceResult<()> {
        if permission.allows(caller, owner) {
            Ok(())
        } else {
            Err(CommerceError::Forbidden)
        }
    }

    /// Load an order the caller may act on.
    ///
    /// A caller who cannot act on other users' orders gets `Forbidden` for a
    /// missing id as well, so an id does not reveal whether the order exists.
    async fn order_for(
        &self,
        caller: &Caller,
        permission: Permission,
        order_id: Uuid,
    ) -> CommerceResult<Order> {
        match self.orders.get_order(order_id).await {
            Ok(order) => {
                self.authorize(caller, permission, Some(order.user_id))?;
                Ok(order)
            }
            Err(CommerceError::OrderNotFound) if !permission.allows(caller, None) => {
                Err(CommerceError::Forbidden)
            }
            Err(err) => Err(err),
        }
    }

    // Public

    pub async fn register(&self, new_user: NewUser) -> CommerceResult<User> {
        Ok(self.identity.register(new_user).await?)
    }

    pub async fn login(&self, email: &str, password: &str) -> CommerceResult<Session> {
        let user = self.identity.verify_credentials(email, password).await?;
        let token = self.identity.issue_token(&user)?;
        Ok(Session {
            token,
            token_type: "Bearer",
            expires_in: self.identity.token_ttl_seconds(),
            user,
        })
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> CommerceResult<ProductPage> {
        self.catalog.list_products(filter).await
    }

    pub async fn get_product(&self, id: Uuid) -> CommerceResult<Product> {
        self.catalog.get_product(id).await
    }

    pub async fn list_categories(&self) -> CommerceResult<Vec<Category>> {
        self.catalog.list_categories().await
    }

    // Any authenticated caller

    pub async fn rate_product(
        &self,
        caller: &Caller,
        product_id: Uuid,
        stars: u8,
    ) -> CommerceResult<Product> {
        self.authorize(caller, Permission::RateProduct, None)?;
        self.catalog.rate_product(product_id, stars).await
    }

    // Owner only

    pub async fn get_cart(&self, caller: &Caller) -> CommerceResult<CartView> {
        self.authorize(caller, Permission::UseCart, Some(caller.user_id))?;
        self.carts.get_cart(caller.user_id).await
    }

    pub async fn add_to_cart(
        &self,
        caller: &Caller,
        product_id: Uuid,
        quantity: i32,
    ) -> CommerceResult<CartView> {
        self.authorize(caller, Permission::UseCart, Some(caller.user_id))?;
        self.carts.add_item(caller.user_id, product_id, quantity).await
    }

    pub async fn update_cart_item(
        &self,
        caller: &Caller,
        product_id: Uuid,
        quantity: i32,
    ) -> CommerceResult<CartView> {
        self.authorize(caller, Permission::UseCart, Some(caller.user_id))?;
        self.carts
            .update_item(caller.user_id, product_id, quantity)
            .await
    }

    pub async fn remove_from_cart(
        &self,
        caller: &Caller,
        product_id: Uuid,
    ) -> CommerceResult<CartView> {
        self.authorize(caller, Permission::UseCart, Some(caller.user_id))?;
        self.carts.remove_item(caller.user_id, product_id).await
    }

    pub async fn clear_cart(&self, caller: &Caller) -> CommerceResult<CartView> {
        self.authorize(caller, Permission::UseCart, Some(caller.user_id))?;
        self.carts.clear(caller.user_id).await
    }

    pub async fn checkout(&self, caller: &Caller, payment_method: &str) -> CommerceResult<Order> {
        self.authorize(caller, Permission::Checkout, Some(caller.user_id))?;
        self.orders.checkout(caller.user_id, payment_method).await
    }

    #[instrument(skip(self, caller, payment_result), fields(user_id = %caller.user_id))]
    pub async fn confirm_payment(
        &self,
        caller: &Caller,
        order_id: Uuid,
        payment_result: serde_json::Value,
    ) -> CommerceResult<Order> {
        self.order_for(caller, Permission::ConfirmPayment, order_id).await?;
        self.orders.confirm_payment(order_id, payment_result).await
    }

    pub async fn change_password(
        &self,
        caller: &Caller,
        current_password: &str,
        new_password: &str,
    ) -> CommerceResult<()> {
        self.authorize(caller, Permission::ChangePassword, Some(caller.user_id))?;
        Ok(self
            .identity
            .change_password(caller.user_id, current_password, new_password)
            .await?)
    }

    // Owner or admin

    pub async fn get_order(&self, caller: &Caller, order_id: Uuid) -> CommerceResult<Order> {
        self.order_for(caller, Permission::ViewOrder, order_id).await
    }

    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn cancel_order(&self, caller: &Caller, order_id: Uuid) -> CommerceResult<Order> {
        self.order_for(caller, Permission::CancelOrder, order_id).await?;
        self.orders.cancel(order_id).await
    }

    pub async fn get_user(&self, caller: &Caller, user_id: Uuid) -> CommerceResult<User> {
        self.authorize(caller, Permission::ViewProfile, Some(user_id))?;
        self.identity.get_user(user_id).await.map_err(|e| match e {
            AuthError::UserNotFound => CommerceError::UserNotFound,
            other => other.into(),
        })
    }

    pub async fn list_orders_for_user(
        &self,
        caller: &Caller,
        user_id: Uuid,
    ) -> CommerceResult<Vec<Order>> {
        self.authorize(caller, Permission::ListUserOrders, Some(user_id))?;
        self.orders.list_orders_for_user(user_id).await
    }

    // Admin only

    pub async fn create_category(
        &self,
        caller: &Caller,
        input: NewCategory,
    ) -> CommerceResult<Category> {
        self.authorize(caller, Permission::ManageCatalog, None)?;
        self.catalog.create_category(input).await
    }

    pub async fn create_product(
        &self,
        caller: &Caller,
        input: NewProduct,
    ) -> CommerceResult<Product> {
        self.authorize(caller, Permission::ManageCatalog, None)?;
        self.catalog.create_product(input).await
    }

    pub async fn update_product(
        &self,
        caller: &Caller,
        product_id: Uuid,
        update: ProductUpdate,
    ) -> CommerceResult<Product> {
        self.authorize(caller, Permission::ManageCatalog, None)?;
        self.catalog.update_product(product_id, update).await
    }

    pub async fn restock(
        &self,
        caller: &Caller,
        product_id: Uuid,
        quantity: i32,
    ) -> CommerceResult<Product> {
        self.authorize(caller, Permission::ManageCatalog, None)?;
        self.catalog.restock(product_id, quantity).await
    }

    pub async fn advance_order_status(
        &self,
        caller: &Caller,
        order_id: Uuid,
        target: OrderStatus,
    ) -> CommerceResult<Order> {
        self.authorize(caller, Permission::AdvanceOrderStatus, None)?;
        self.orders.advance_status(order_id, target).await
    }

    pub async fn list_all_orders(&self, caller: &Caller) -> CommerceResult<Vec<Order>> {
        self.authorize(caller, Permission::ListAllOrders, None)?;
        self.orders.list_orders().await
    }

    pub async fn list_users(&self, caller: &Caller) -> CommerceResult<Vec<User>> {
        self.authorize(caller, Permission::ListUsers, None)?;
        Ok(self.identity.list_users().await?)
    }

    pub async fn set_role(
        &self,
        caller: &Caller,
        user_id: Uuid,
        role: Role,
    ) -> CommerceResult<User> {
        self.authorize(caller, Permission::SetRole, None)?;
        self.identity.set_role(user_id, role).await.map_err(|e| match e {
            AuthError::UserNotFound => CommerceError::UserNotFound,
            other => other.into(),
        })
    }
}
