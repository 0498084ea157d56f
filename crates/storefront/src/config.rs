//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `GREENGROCER_API_URL` - Base URL of the commerce API
//!
//! ## Optional
//! - `GREENGROCER_CART_DIR` - Directory for durable cart snapshots
//!   (unset disables cart persistence, e.g. in ephemeral contexts)
//! - `GREENGROCER_HTTP_TIMEOUT_SECS` - HTTP request timeout (default: 30)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_HTTP_TIMEOUT_SECS: &str = "30";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Base URL of the commerce API
    pub api_base_url: Url,
    /// Directory for durable cart snapshots; `None` disables persistence
    pub cart_dir: Option<PathBuf>,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = get_required_env("GREENGROCER_API_URL")?;
        let cart_dir = get_optional_env("GREENGROCER_CART_DIR");
        let timeout = get_env_or_default("GREENGROCER_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS);

        Self::build(&api_url, cart_dir, &timeout)
    }

    /// Build a validated configuration from raw string values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the base URL or timeout does
    /// not parse.
    pub fn build(
        api_url: &str,
        cart_dir: Option<String>,
        timeout_secs: &str,
    ) -> Result<Self, ConfigError> {
        let mut api_base_url = Url::parse(api_url).map_err(|e| {
            ConfigError::InvalidEnvVar("GREENGROCER_API_URL".to_string(), e.to_string())
        })?;

        // Relative endpoint paths are joined onto the base; without a
        // trailing slash Url::join would drop the last path segment.
        if !api_base_url.path().ends_with('/') {
            api_base_url.set_path(&format!("{}/", api_base_url.path()));
        }

        let timeout_secs = timeout_secs.parse::<u64>().map_err(|e| {
            ConfigError::InvalidEnvVar("GREENGROCER_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
        })?;

        Ok(Self {
            api_base_url,
            cart_dir: cart_dir.map(PathBuf::from),
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_valid() {
        let config =
            StorefrontConfig::build("https://api.example.com/v1/", Some("/tmp/cart".into()), "15")
                .unwrap();
        assert_eq!(config.api_base_url.as_str(), "https://api.example.com/v1/");
        assert_eq!(config.cart_dir, Some(PathBuf::from("/tmp/cart")));
        assert_eq!(config.http_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_build_without_cart_dir() {
        let config = StorefrontConfig::build("https://api.example.com", None, "30").unwrap();
        assert!(config.cart_dir.is_none());
    }

    #[test]
    fn test_build_normalizes_base_path() {
        let config = StorefrontConfig::build("https://api.example.com/v1", None, "30").unwrap();
        assert_eq!(config.api_base_url.path(), "/v1/");
        // join() now keeps the version segment
        assert_eq!(
            config.api_base_url.join("products").unwrap().as_str(),
            "https://api.example.com/v1/products"
        );
    }

    #[test]
    fn test_build_invalid_url() {
        let result = StorefrontConfig::build("not a url", None, "30");
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(key, _)) if key == "GREENGROCER_API_URL"));
    }

    #[test]
    fn test_build_invalid_timeout() {
        let result = StorefrontConfig::build("https://api.example.com", None, "soon");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "GREENGROCER_HTTP_TIMEOUT_SECS"
        ));
    }
}
