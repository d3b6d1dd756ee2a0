use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Default page size for product listings
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Largest page a caller may request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Product category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: String, slug: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            slug,
            description,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a category
#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Catalog product. Price and stock here are the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub stock: i32,
    pub rating: f64,
    pub num_reviews: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(input: NewProduct) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            category_id: input.category_id,
            name: input.name,
            description: input.description,
            price: input.price,
            image: input.image,
            stock: input.stock,
            rating: 0.0,
            num_reviews: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold one rating into the running average
    pub fn add_rating(&mut self, stars: u8) {
        let count = f64::from(self.num_reviews);
        self.rating = (self.rating * count + f64::from(stars)) / (count + 1.0);
        self.num_reviews += 1;
    }
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub category_id: Option<Uuid>,
}

/// Partial update of a product's descriptive fields. Stock is changed only
/// through restock and checkout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub image: Option<String>,
    pub category_id: Option<Uuid>,
}

impl ProductUpdate {
    pub fn apply_to(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(image) = self.image {
            product.image = Some(image);
        }
        if let Some(category_id) = self.category_id {
            product.category_id = Some(category_id);
        }
        product.updated_at = Utc::now();
    }
}

/// Product listing query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub in_stock: bool,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductFilter {
    /// 1-based page number
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }

    /// Trimmed, lower-cased search term, if any
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category_id) = self.category_id {
            if product.category_id != Some(category_id) {
                return false;
            }
        }
        if let Some(term) = self.search_term() {
            if !product.name.to_lowercase().contains(&term) {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        !(self.in_stock && product.stock <= 0)
    }
}

/// One page of products
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// Derive a URL slug from a display name
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
