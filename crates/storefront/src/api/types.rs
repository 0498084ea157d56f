//! Wire types for the commerce API.
//!
//! The API's response envelope varies by endpoint: some return a raw array,
//! some wrap in `{"data": ...}`, some key by collection name
//! (`{"products": [...]}`). The unwrap helpers at the bottom normalize all
//! three shapes before deserialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use greengrocer_core::{AddressId, CategoryId, CustomerId, Email, OrderId, Price, ProductId};

use super::ApiError;

// =============================================================================
// Catalog
// =============================================================================

/// A product in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub description: Option<String>,
    /// Category slug the product is filed under.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

/// A browsing category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

// =============================================================================
// Orders
// =============================================================================

/// A single line in an order placement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// An order placement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub items: Vec<NewOrderLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_id: Option<AddressId>,
}

/// Order lifecycle status as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// An order confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub total: Price,
}

// =============================================================================
// Customers
// =============================================================================

/// The authenticated customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: Email,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Profile fields a customer may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// A saved delivery address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// A delivery address to save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAddress {
    pub line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

// =============================================================================
// Envelope Unwrapping
// =============================================================================

/// Deserialize a collection response regardless of envelope shape.
///
/// Accepts a raw array, `{"data": <array>}` (recursively, so
/// `{"data": {"products": [...]}}` also works), or `{"<key>": <array>}`.
pub(crate) fn unwrap_collection<T: serde::de::DeserializeOwned>(
    value: Value,
    key: &str,
) -> Result<Vec<T>, ApiError> {
    match value {
        Value::Array(_) => Ok(serde_json::from_value(value)?),
        Value::Object(mut map) => {
            if let Some(inner) = map.remove("data") {
                return unwrap_collection(inner, key);
            }
            if let Some(inner) = map.remove(key) {
                return Ok(serde_json::from_value(inner)?);
            }
            Err(ApiError::Envelope(format!(
                "expected an array, a data envelope, or a '{key}' field"
            )))
        }
        other => Err(ApiError::Envelope(format!(
            "expected an array or object, got {other}"
        ))),
    }
}

/// Deserialize a single-entity response regardless of envelope shape.
///
/// Accepts the entity object directly or wrapped in `{"data": ...}`.
pub(crate) fn unwrap_entity<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            // remove() cannot fail after contains_key, but stay total
            map.remove("data").map_or_else(
                || Err(ApiError::Envelope("empty data envelope".to_string())),
                unwrap_entity,
            )
        }
        other => Ok(serde_json::from_value(other)?),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product_json(id: i64, name: &str) -> Value {
        json!({"id": id, "name": name, "price": "2.50"})
    }

    #[test]
    fn test_unwrap_collection_raw_array() {
        let value = json!([product_json(1, "Apples"), product_json(2, "Pears")]);
        let products: Vec<Product> = unwrap_collection(value, "products").unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Apples");
    }

    #[test]
    fn test_unwrap_collection_data_envelope() {
        let value = json!({"data": [product_json(1, "Apples")]});
        let products: Vec<Product> = unwrap_collection(value, "products").unwrap();
        assert_eq!(products.len(), 1);
    }

    #[test]
    fn test_unwrap_collection_keyed_envelope() {
        let value = json!({"products": [product_json(1, "Apples")]});
        let products: Vec<Product> = unwrap_collection(value, "products").unwrap();
        assert_eq!(products.len(), 1);
    }

    #[test]
    fn test_unwrap_collection_nested_data_envelope() {
        let value = json!({"data": {"products": [product_json(1, "Apples")]}});
        let products: Vec<Product> = unwrap_collection(value, "products").unwrap();
        assert_eq!(products.len(), 1);
    }

    #[test]
    fn test_unwrap_collection_unknown_shape() {
        let value = json!({"stuff": []});
        let result: Result<Vec<Product>, _> = unwrap_collection(value, "products");
        assert!(matches!(result, Err(ApiError::Envelope(_))));
    }

    #[test]
    fn test_unwrap_entity_plain_and_wrapped() {
        let plain: Product = unwrap_entity(product_json(1, "Apples")).unwrap();
        assert_eq!(plain.id, ProductId::new(1));

        let wrapped: Product = unwrap_entity(json!({"data": product_json(2, "Pears")})).unwrap();
        assert_eq!(wrapped.id, ProductId::new(2));
    }

    #[test]
    fn test_product_accepts_numeric_price() {
        // rust_decimal deserializes from JSON numbers as well as strings
        let product: Product =
            serde_json::from_value(json!({"id": 3, "name": "Milk", "price": 1.25})).unwrap();
        assert_eq!(product.price.to_string(), "1.25");
    }

    #[test]
    fn test_order_status_wire_format() {
        let status: OrderStatus = serde_json::from_value(json!("pending")).unwrap();
        assert_eq!(status, OrderStatus::Pending);
        assert_eq!(serde_json::to_value(OrderStatus::Shipped).unwrap(), json!("shipped"));
    }
}
