//! Client configuration.

use std::time::Duration;

use crate::error::{ClientError, Result};

/// Default API location for a locally running server.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// API client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the expense API, without a trailing slash.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for the given base URL with the default timeout.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("EXPENSE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Ok(Self::new(&base_url)?.with_timeout(Self::timeout_from_env()))
    }

    /// Timeout from `EXPENSE_REQUEST_TIMEOUT_SECS`, or the default.
    pub fn timeout_from_env() -> Duration {
        std::env::var("EXPENSE_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Join an API path (starting with `/`) onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| ClientError::Config(format!("invalid base URL '{}': {}", raw, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        scheme => Err(ClientError::Config(format!(
            "unsupported URL scheme '{}' in '{}'",
            scheme, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_base_url_normalization() {
        let config = ClientConfig::new("https://api.example.com/").unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(
            config.url("/api/expenses/"),
            "https://api.example.com/api/expenses/"
        );
    }

    #[test]
    fn test_rejects_invalid_urls() {
        assert!(matches!(
            ClientConfig::new("not a url"),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::new("ftp://example.com"),
            Err(ClientError::Config(_))
        ));
    }
}
