//! Typed commerce API client.
//!
//! Thin endpoint surface over the [`ApiGateway`]. Catalog reads (products,
//! categories) are cached with `moka` (5-minute TTL); search and every
//! mutation go straight to the network.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use greengrocer_core::{Email, ProductId};

use super::cache::CacheValue;
use super::gateway::ApiGateway;
use super::types::{
    Address, Category, Customer, NewAddress, NewOrder, Order, Product, ProfileUpdate,
    unwrap_collection, unwrap_entity,
};
use super::{ApiError, truncate_body};

/// Catalog cache time-to-live.
const CACHE_TTL: Duration = Duration::from_secs(300); // 5 minutes

/// Catalog cache capacity (entries).
const CACHE_CAPACITY: u64 = 1000;

/// Client for the commerce API.
///
/// Provides typed access to products, categories, orders, authentication,
/// and the customer profile. Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct CommerceClient {
    inner: Arc<CommerceClientInner>,
}

struct CommerceClientInner {
    gateway: ApiGateway,
    cache: Cache<String, CacheValue>,
}

impl CommerceClient {
    /// Create a new commerce API client over a gateway.
    #[must_use]
    pub fn new(gateway: ApiGateway) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();

        Self {
            inner: Arc::new(CommerceClientInner { gateway, cache }),
        }
    }

    /// Read a response body, mapping non-success statuses to errors.
    async fn read_json(response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    // =========================================================================
    // Product Methods
    // =========================================================================

    /// Get a page of the product catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn products(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<Vec<Product>, ApiError> {
        let cache_key = format!(
            "products:{}:{}",
            page.unwrap_or(1),
            per_page.map_or_else(|| "-".to_string(), |n| n.to_string())
        );

        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let mut query: Vec<(&str, u32)> = Vec::new();
        if let Some(page) = page {
            query.push(("page", page));
        }
        if let Some(per_page) = per_page {
            query.push(("limit", per_page));
        }

        let response = self.inner.gateway.get_query("products", &query).await?;
        let products: Vec<Product> =
            unwrap_collection(Self::read_json(response).await?, "products")?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(products.clone()))
            .await;

        Ok(products)
    }

    /// Search the catalog. Results are never cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>, ApiError> {
        let response = self
            .inner
            .gateway
            .get_query("products/search", &[("q", query)])
            .await?;

        unwrap_collection(Self::read_json(response).await?, "products")
    }

    /// Get a product by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found or the request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product, ApiError> {
        let cache_key = format!("product:{id}");

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let response = self.inner.gateway.get(&format!("products/{id}")).await?;
        let product: Product = match Self::read_json(response).await {
            Ok(value) => unwrap_entity(value)?,
            Err(ApiError::Status { status, .. }) if status == reqwest::StatusCode::NOT_FOUND => {
                return Err(ApiError::NotFound(format!("Product not found: {id}")));
            }
            Err(other) => return Err(other),
        };

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    // =========================================================================
    // Category Methods
    // =========================================================================

    /// Get all browsing categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        let cache_key = "categories".to_string();

        if let Some(CacheValue::Categories(categories)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let response = self.inner.gateway.get("categories").await?;
        let categories: Vec<Category> =
            unwrap_collection(Self::read_json(response).await?, "categories")?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Categories(categories.clone()))
            .await;

        Ok(categories)
    }

    // =========================================================================
    // Order Methods (not cached - mutable state)
    // =========================================================================

    /// Place an order.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidInput` for an empty order, or an error if
    /// the API request fails.
    #[instrument(skip(self, order))]
    pub async fn place_order(&self, order: &NewOrder) -> Result<Order, ApiError> {
        if order.items.is_empty() {
            return Err(ApiError::InvalidInput(
                "order must contain at least one item".to_string(),
            ));
        }

        let response = self.inner.gateway.post_json("orders", order).await?;
        unwrap_entity(Self::read_json(response).await?)
    }

    // =========================================================================
    // Auth Methods
    // =========================================================================

    /// Log in with email and password. Credentials land in the cookie jar.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Email` for a malformed email, or an error if the
    /// API rejects the credentials.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Customer, ApiError> {
        let email = Email::parse(email)?;

        let response = self
            .inner
            .gateway
            .post_json("auth/login", &json!({"email": email, "password": password}))
            .await?;

        unwrap_entity(Self::read_json(response).await?)
    }

    /// Register a new customer account.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Email` for a malformed email, or an error if the
    /// API rejects the registration.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Customer, ApiError> {
        let email = Email::parse(email)?;

        let response = self
            .inner
            .gateway
            .post_json(
                "auth/register",
                &json!({
                    "email": email,
                    "password": password,
                    "first_name": first_name,
                    "last_name": last_name,
                }),
            )
            .await?;

        unwrap_entity(Self::read_json(response).await?)
    }

    /// Log out, invalidating the session server-side.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        let response = self.inner.gateway.post_empty("auth/logout").await?;
        Self::read_json(response).await.map(|_| ()).or_else(|err| {
            // Some deployments reply with an empty body; only a bad status
            // is a failure
            match err {
                ApiError::Parse(_) => Ok(()),
                other => Err(other),
            }
        })
    }

    /// Get the currently authenticated customer.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is invalid or the request fails.
    #[instrument(skip(self))]
    pub async fn current_customer(&self) -> Result<Customer, ApiError> {
        let response = self.inner.gateway.get("auth/me").await?;
        unwrap_entity(Self::read_json(response).await?)
    }

    // =========================================================================
    // Profile Methods
    // =========================================================================

    /// Update the customer's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Customer, ApiError> {
        let response = self.inner.gateway.put_json("users/me", update).await?;
        unwrap_entity(Self::read_json(response).await?)
    }

    /// Get the customer's saved delivery addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn addresses(&self) -> Result<Vec<Address>, ApiError> {
        let response = self.inner.gateway.get("users/me/addresses").await?;
        unwrap_collection(Self::read_json(response).await?, "addresses")
    }

    /// Save a new delivery address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, address))]
    pub async fn add_address(&self, address: &NewAddress) -> Result<Address, ApiError> {
        let response = self
            .inner
            .gateway
            .post_json("users/me/addresses", address)
            .await?;
        unwrap_entity(Self::read_json(response).await?)
    }

    /// Delete a saved delivery address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(address_id = %id))]
    pub async fn remove_address(&self, id: greengrocer_core::AddressId) -> Result<(), ApiError> {
        let response = self
            .inner
            .gateway
            .delete(&format!("users/me/addresses/{id}"))
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status,
            body: truncate_body(&body),
        })
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    /// Invalidate a cached product.
    pub async fn invalidate_product(&self, id: ProductId) {
        self.inner.cache.invalidate(&format!("product:{id}")).await;
    }

    /// Invalidate all cached catalog data.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}
