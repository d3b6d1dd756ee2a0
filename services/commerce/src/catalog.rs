//! Catalog service
//!
//! Validates catalog input before it reaches the store. Stock only changes
//! through [`CatalogService::restock`] and checkout.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{CommerceError, CommerceResult};
use crate::models::{
    Category, MAX_PRICE, NewCategory, NewProduct, Product, ProductFilter, ProductPage,
    ProductUpdate, slugify,
};
use crate::repositories::CatalogRepository;

/// Catalog service
#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogRepository>,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(&self, input: NewCategory) -> CommerceResult<Category> {
        let name = required_text("category name", &input.name)?;
        let slug = slugify(input.slug.as_deref().unwrap_or(&name));
        if slug.is_empty() {
            return Err(CommerceError::Validation(
                "category slug must contain letters or digits".to_string(),
            ));
        }
        let description = input
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let category = Category::new(name, slug, description);
        self.catalog.insert_category(&category).await?;

        info!(category_id = %category.id, slug = %category.slug, "Category created");
        Ok(category)
    }

    pub async fn list_categories(&self) -> CommerceResult<Vec<Category>> {
        self.catalog.list_categories().await
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, mut input: NewProduct) -> CommerceResult<Product> {
        input.name = required_text("product name", &input.name)?;
        input.description = input.description.trim().to_string();
        validate_price(input.price)?;
        if input.stock < 0 {
            return Err(CommerceError::Validation("stock cannot be negative".to_string()));
        }
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        let product = Product::new(input);
        self.catalog.insert_product(&product).await?;

        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    #[instrument(skip(self, update))]
    pub async fn update_product(&self, id: Uuid, update: ProductUpdate) -> CommerceResult<Product> {
        let mut product = self.get_product(id).await?;

        if let Some(name) = &update.name {
            required_text("product name", name)?;
        }
        if let Some(price) = update.price {
            validate_price(price)?;
        }
        if let Some(category_id) = update.category_id {
            self.ensure_category(category_id).await?;
        }

        update.apply_to(&mut product);
        product.name = product.name.trim().to_string();

        if !self.catalog.update_product_details(&product).await? {
            return Err(CommerceError::ProductNotFound);
        }

        info!(product_id = %id, "Product updated");
        self.get_product(id).await
    }

    pub async fn get_product(&self, id: Uuid) -> CommerceResult<Product> {
        self.catalog
            .find_product(id)
            .await?
            .ok_or(CommerceError::ProductNotFound)
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> CommerceResult<ProductPage> {
        if let (Some(min), Some(max)) = (filter.min_price, filter.max_price) {
            if min > max {
                return Err(CommerceError::Validation(
                    "min_price cannot exceed max_price".to_string(),
                ));
            }
        }
        self.catalog.list_products(filter).await
    }

    /// Take units out of stock outside of checkout
    pub async fn decrement_stock(&self, id: Uuid, quantity: i32) -> CommerceResult<Product> {
        self.catalog.decrement_stock(id, quantity).await
    }

    #[instrument(skip(self))]
    pub async fn restock(&self, id: Uuid, quantity: i32) -> CommerceResult<Product> {
        let product = self.catalog.increment_stock(id, quantity).await?;
        info!(product_id = %id, stock = product.stock, "Product restocked");
        Ok(product)
    }

    pub async fn rate_product(&self, id: Uuid, stars: u8) -> CommerceResult<Product> {
        if !(1..=5).contains(&stars) {
            return Err(CommerceError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }
        self.catalog.record_rating(id, stars).await
    }

    async fn ensure_category(&self, id: Uuid) -> CommerceResult<()> {
        match self.catalog.find_category(id).await? {
            Some(_) => Ok(()),
            None => Err(CommerceError::CategoryNotFound),
        }
    }
}

fn required_text(field: &str, value: &str) -> CommerceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CommerceError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Prices are non-negative, at most `MAX_PRICE`, with at most two decimal places
fn validate_price(price: Decimal) -> CommerceResult<()> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(CommerceError::Validation("price cannot be negative".to_string()));
    }
    if price > MAX_PRICE {
        return Err(CommerceError::Validation(format!(
            "price cannot exceed {MAX_PRICE}"
        )));
    }
    if price.normalize().scale() > 2 {
        return Err(CommerceError::Validation(
            "price has more than two decimal places".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;

    fn service() -> CatalogService {
        CatalogService::new(Arc::new(MemoryStore::new()))
    }

    fn lamp(price: Decimal, stock: i32) -> NewProduct {
        NewProduct {
            name: "Desk Lamp".to_string(),
            description: "Warm light".to_string(),
            price,
            image: None,
            stock,
            category_id: None,
        }
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(Decimal::new(1999, 2)).is_ok());
        assert!(validate_price(Decimal::ZERO).is_ok());
        assert!(validate_price(Decimal::new(10000, 4)).is_ok());
        assert!(validate_price(Decimal::new(-1, 0)).is_err());
        assert!(validate_price(Decimal::new(1001, 3)).is_err());
        assert!(validate_price(MAX_PRICE).is_ok());
        assert!(validate_price(MAX_PRICE + Decimal::new(1, 2)).is_err());
    }

    #[tokio::test]
    async fn test_oversized_price_is_rejected() {
        let catalog = service();
        let huge = Decimal::from_scientific("1e28").unwrap();

        let err = catalog.create_product(lamp(huge, 100)).await.unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));

        let product = catalog.create_product(lamp(Decimal::from(5), 100)).await.unwrap();
        let update = ProductUpdate {
            price: Some(huge),
            ..ProductUpdate::default()
        };
        let err = catalog.update_product(product.id, update).await.unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));
        assert_eq!(catalog.get_product(product.id).await.unwrap().price, Decimal::from(5));
    }

    #[tokio::test]
    async fn test_create_category_derives_slug() {
        let catalog = service();
        let category = catalog
            .create_category(NewCategory {
                name: " Home & Garden ".to_string(),
                slug: None,
                description: None,
            })
            .await
            .unwrap();

        assert_eq!(category.name, "Home & Garden");
        assert_eq!(category.slug, "home-garden");

        let duplicate = catalog
            .create_category(NewCategory {
                name: "Home and Garden".to_string(),
                slug: Some("Home Garden".to_string()),
                description: None,
            })
            .await;
        assert!(matches!(duplicate, Err(CommerceError::DuplicateCategory)));
    }

    #[tokio::test]
    async fn test_create_product_validates() {
        let catalog = service();

        assert!(matches!(
            catalog.create_product(lamp(Decimal::new(-100, 2), 1)).await,
            Err(CommerceError::Validation(_))
        ));
        assert!(matches!(
            catalog.create_product(lamp(Decimal::ONE, -1)).await,
            Err(CommerceError::Validation(_))
        ));

        let mut orphan = lamp(Decimal::ONE, 1);
        orphan.category_id = Some(Uuid::new_v4());
        assert!(matches!(
            catalog.create_product(orphan).await,
            Err(CommerceError::CategoryNotFound)
        ));
    }

    #[tokio::test]
    async fn test_update_product_keeps_stock() {
        let catalog = service();
        let product = catalog
            .create_product(lamp(Decimal::new(2500, 2), 4))
            .await
            .unwrap();

        let updated = catalog
            .update_product(
                product.id,
                ProductUpdate {
                    price: Some(Decimal::new(3000, 2)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.price, Decimal::new(3000, 2));
        assert_eq!(updated.stock, 4);
        assert!(matches!(
            catalog
                .update_product(Uuid::new_v4(), ProductUpdate::default())
                .await,
            Err(CommerceError::ProductNotFound)
        ));
    }

    #[tokio::test]
    async fn test_restock_and_decrement() {
        let catalog = service();
        let product = catalog.create_product(lamp(Decimal::ONE, 1)).await.unwrap();

        assert_eq!(catalog.restock(product.id, 4).await.unwrap().stock, 5);
        assert!(matches!(
            catalog.restock(product.id, 0).await,
            Err(CommerceError::InvalidQuantity)
        ));
        assert_eq!(catalog.decrement_stock(product.id, 5).await.unwrap().stock, 0);
        assert!(matches!(
            catalog.decrement_stock(product.id, 1).await,
            Err(CommerceError::InsufficientStock { .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_product_bounds() {
        let catalog = service();
        let product = catalog.create_product(lamp(Decimal::ONE, 1)).await.unwrap();

        assert!(matches!(
            catalog.rate_product(product.id, 0).await,
            Err(CommerceError::Validation(_))
        ));
        assert!(matches!(
            catalog.rate_product(product.id, 6).await,
            Err(CommerceError::Validation(_))
        ));

        let rated = catalog.rate_product(product.id, 4).await.unwrap();
        assert_eq!(rated.num_reviews, 1);
        assert!((rated.rating - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_list_products_filters_and_pages() {
        let catalog = service();
        for (name, stock) in [("Alpha", 1), ("Beta", 0), ("Gamma", 3)] {
            let mut input = lamp(Decimal::ONE, stock);
            input.name = name.to_string();
            catalog.create_product(input).await.unwrap();
        }

        let in_stock = catalog
            .list_products(&ProductFilter {
                in_stock: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = in_stock.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Gamma"]);
        assert_eq!(in_stock.total, 2);

        let second_page = catalog
            .list_products(&ProductFilter {
                page: Some(2),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(second_page.items.len(), 1);
        assert_eq!(second_page.items[0].name, "Gamma");
        assert_eq!(second_page.total, 3);

        assert!(matches!(
            catalog
                .list_products(&ProductFilter {
                    min_price: Some(Decimal::TEN),
                    max_price: Some(Decimal::ONE),
                    ..Default::default()
                })
                .await,
            Err(CommerceError::Validation(_))
        ));
    }
}
