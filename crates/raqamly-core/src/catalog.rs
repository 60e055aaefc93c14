//! Products

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use raqamly_backend::{DataAccess, Query, Upload};
use raqamly_navigation::{Navigator, Route};
use raqamly_session::SessionGuard;

use crate::accounts::object_path;
use crate::error::CoreError;
use crate::profile::authenticated_user;
use crate::Result;

pub const PRODUCT_IMAGE_BUCKET: &str = "product-images";
pub const PRODUCTS_TABLE: &str = "products";

/// Fields of the add-product form
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub images: Vec<Upload>,
}

/// A stored product row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: Option<Value>,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    /// Public image URLs joined with `,`
    #[serde(default)]
    pub image_url: String,
}

impl Product {
    pub fn image_urls(&self) -> Vec<&str> {
        self.image_url
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .collect()
    }
}

/// Parse the price field of the add-product form
pub fn parse_price(input: &str) -> Result<f64> {
    let input = input.trim();
    let price: f64 = input
        .parse()
        .map_err(|_| CoreError::InvalidInput(format!("price '{}' is not a number", input)))?;
    validate_price(price)
}

/// Prices are finite and non-negative
pub fn validate_price(price: f64) -> Result<f64> {
    if !price.is_finite() || price < 0.0 {
        return Err(CoreError::InvalidInput(format!(
            "price '{}' must be a non-negative amount",
            price
        )));
    }
    Ok(price)
}

#[derive(Clone)]
pub struct CatalogService {
    data: DataAccess,
    guard: SessionGuard,
    navigator: Navigator,
}

impl CatalogService {
    pub fn new(data: DataAccess, guard: SessionGuard, navigator: Navigator) -> Self {
        Self {
            data,
            guard,
            navigator,
        }
    }

    /// Upload the images, store the product and go to the product list
    pub async fn add_product(&self, product: NewProduct) -> Result<Product> {
        if product.name.trim().is_empty() {
            return Err(CoreError::InvalidInput("product name is required".to_string()));
        }
        let price = validate_price(product.price)?;
        let user = authenticated_user(&self.guard, &self.data).await?;

        let bucket = self.data.bucket(PRODUCT_IMAGE_BUCKET);
        let mut image_urls = Vec::with_capacity(product.images.len());
        for image in &product.images {
            let path = object_path(&user.id, &image.file_name);
            let stored = bucket.upload(&path, image).await?;
            image_urls.push(bucket.public_url(&stored.path)?.to_string());
        }

        let mut row = Map::new();
        row.insert("user_id".to_string(), Value::String(user.id.clone()));
        row.insert("name".to_string(), Value::String(product.name));
        row.insert("description".to_string(), Value::String(product.description));
        row.insert("price".to_string(), Value::from(price));
        row.insert("category".to_string(), Value::String(product.category));
        row.insert("image_url".to_string(), Value::String(image_urls.join(",")));

        let inserted = self
            .data
            .table(PRODUCTS_TABLE)
            .insert(vec![row])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound("inserted product".to_string()))?;
        let product: Product = serde_json::from_value(Value::Object(inserted))?;

        tracing::info!(
            user_id = %user.id,
            images = image_urls.len(),
            "Added product"
        );

        self.navigator.navigate(Route::Products.path())?;
        Ok(product)
    }

    /// Products owned by the signed-in user
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let user = authenticated_user(&self.guard, &self.data).await?;

        let rows = self
            .data
            .table(PRODUCTS_TABLE)
            .select(&Query::new().eq("user_id", user.id.as_str()))
            .await?;

        rows.into_iter()
            .map(|row| Ok(serde_json::from_value(Value::Object(row))?))
            .collect()
    }
}
