//! Commerce API access.
//!
//! # Architecture
//!
//! - [`gateway`] - Authenticated HTTP dispatch: cookie-carried credentials
//!   and the single-flight refresh-on-401 protocol
//! - [`client`] - Typed endpoint surface (products, categories, orders,
//!   auth, profile) over the gateway, with in-memory caching via `moka`
//!   for read-mostly endpoints (5 minute TTL)
//! - [`types`] - Wire types and the defensive response-envelope unwrapping
//!
//! The remote API is the source of truth - no local sync, direct calls.

mod cache;
pub mod client;
pub mod gateway;
pub mod types;

pub use client::CommerceClient;
pub use gateway::{ApiGateway, Navigator, NoopNavigator, SessionEvent};
pub use types::*;

use thiserror::Error;

/// Errors that can occur when interacting with the commerce API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned a non-success status.
    #[error("API returned {status}: {body}")]
    Status {
        /// HTTP status code of the response.
        status: reqwest::StatusCode,
        /// Response body, truncated for logging.
        body: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The response envelope had an unrecognized shape.
    #[error("unexpected response shape: {0}")]
    Envelope(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before reaching the network.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid email supplied to an auth call.
    #[error("Invalid email: {0}")]
    Email(#[from] greengrocer_core::EmailError),

    /// The session could not be refreshed after an authorization failure.
    #[error(transparent)]
    Session(#[from] RefreshError),

    /// A request URL could not be constructed from the configured base.
    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Terminal failure of the token-refresh call.
///
/// Cloneable so the single refresh outcome can be shared with every request
/// that queued behind it.
#[derive(Debug, Clone, Error)]
#[error("session refresh failed: {reason}")]
pub struct RefreshError {
    reason: String,
}

impl RefreshError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Truncate a response body for error messages and logs.
pub(crate) fn truncate_body(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::NotFound("product 123".to_string());
        assert_eq!(err.to_string(), "Not found: product 123");

        let err = ApiError::InvalidInput("cart is empty".to_string());
        assert_eq!(err.to_string(), "Invalid input: cart is empty");
    }

    #[test]
    fn test_refresh_error_is_cloneable() {
        let err = RefreshError::new("refresh endpoint returned 401");
        let shared = err.clone();
        assert_eq!(err.to_string(), shared.to_string());
        assert_eq!(
            shared.to_string(),
            "session refresh failed: refresh endpoint returned 401"
        );
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        assert_eq!(truncate_body(&long).len(), 200);
        assert_eq!(truncate_body("short"), "short");
    }
}
