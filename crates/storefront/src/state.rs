//! Application composition root.
//!
//! The cart store is deliberately an injected instance wired here rather
//! than a hidden module-level global: tests build as many independent
//! storefronts as they like, each with its own cart and persistence.

use std::sync::Arc;

use crate::api::{ApiError, ApiGateway, CommerceClient, Navigator, NewOrder, NewOrderLine, Order};
use crate::cart::{CartPersistence, CartStore, FileStore};
use crate::config::StorefrontConfig;

/// The assembled storefront core shared across the UI.
///
/// Cheaply cloneable via `Arc` and provides access to the commerce client,
/// the cart store, and session events.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    gateway: ApiGateway,
    client: CommerceClient,
    cart: CartStore,
}

impl Storefront {
    /// Assemble the storefront from configuration.
    ///
    /// Cart persistence lands in `config.cart_dir` when set and is disabled
    /// otherwise (e.g. ephemeral contexts); the cart hydrates from any valid
    /// persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        config: StorefrontConfig,
        navigator: Box<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let gateway = ApiGateway::new(&config, navigator)?;
        let client = CommerceClient::new(gateway.clone());

        let persistence = config.cart_dir.as_ref().map_or_else(
            CartPersistence::disabled,
            |dir| CartPersistence::new(Arc::new(FileStore::new(dir))),
        );
        let cart = CartStore::open(persistence);

        Ok(Self {
            inner: Arc::new(StorefrontInner {
                config,
                gateway,
                client,
                cart,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the authenticated API gateway.
    #[must_use]
    pub fn gateway(&self) -> &ApiGateway {
        &self.inner.gateway
    }

    /// Get a reference to the commerce API client.
    #[must_use]
    pub fn client(&self) -> &CommerceClient {
        &self.inner.client
    }

    /// Get a reference to the cart store.
    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    /// Place an order from the current cart, then empty it.
    ///
    /// The cart is cleared only after the order is accepted; a failed
    /// placement leaves it intact for retry.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidInput` for an empty cart, or an error if
    /// order placement fails.
    pub async fn checkout(&self) -> Result<Order, ApiError> {
        let state = self.inner.cart.state();
        if state.is_empty() {
            return Err(ApiError::InvalidInput("cart is empty".to_string()));
        }

        let order = NewOrder {
            items: state
                .items
                .iter()
                .map(|line| NewOrderLine {
                    product_id: line.id,
                    quantity: line.quantity,
                })
                .collect(),
            address_id: None,
        };

        let confirmation = self.inner.client.place_order(&order).await?;
        self.inner.cart.clear_cart();

        Ok(confirmation)
    }
}
