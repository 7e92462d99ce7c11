use std::time::Duration;

use log::debug;
use reqwest::{
    Client, Url,
    header::{HeaderMap, HeaderName, HeaderValue},
};

use crate::error::{Result, TaxRateError};
use crate::retry::RetryOverrides;

pub const DEFAULT_BASE_URL: &str = "https://api.zip-tax.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_USER_AGENT: &str = "taxrate-client";

pub const API_KEY_ENV: &str = "TAXRATE_API_KEY";
pub const BASE_URL_ENV: &str = "TAXRATE_BASE_URL";

const API_KEY_HEADER: &str = "x-api-key";

/// Settings for [`crate::client::TaxRateClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
    /// Client-wide retry settings; per-call overrides are layered on top.
    pub retry: RetryOverrides,
    /// Emit per-request debug lines.
    pub enable_logging: bool,
}

impl ClientConfig {
    /// Creates a config with the given API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetryOverrides::default(),
            enable_logging: false,
        }
    }

    /// Reads the API key and optional base URL from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Like [`ClientConfig::from_env`], with an injectable variable lookup.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_ENV)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                TaxRateError::configuration(format!(
                    "{} environment variable is not set",
                    API_KEY_ENV
                ))
            })?;

        let mut config = Self::new(api_key);
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            config.base_url = base_url;
        }
        Ok(config)
    }

    /// Sets the service base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the client-wide retry overrides.
    pub fn with_retry(mut self, retry: RetryOverrides) -> Self {
        self.retry = retry;
        self
    }

    /// Enables or disables per-request debug logging.
    pub fn with_logging(mut self, enable_logging: bool) -> Self {
        self.enable_logging = enable_logging;
        self
    }

    /// Rejects settings the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(TaxRateError::configuration("API key must not be empty"));
        }
        if self.base_url.trim().is_empty() {
            return Err(TaxRateError::configuration("base URL must not be empty"));
        }
        let url = Url::parse(self.base_url.trim()).map_err(|e| {
            TaxRateError::configuration(format!("invalid base URL '{}': {}", self.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TaxRateError::configuration(format!(
                "base URL must use http or https, got '{}'",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(TaxRateError::configuration("timeout must be greater than zero"));
        }
        self.retry.clone().into_policy()?;
        Ok(())
    }

    /// Builds the reqwest client carrying the API key header.
    pub fn build_http_client(&self) -> Result<Client> {
        let mut headers = HeaderMap::new();
        let mut key_value = HeaderValue::from_str(&self.api_key)
            .map_err(|e| TaxRateError::configuration(format!("invalid API key: {}", e)))?;
        key_value.set_sensitive(true);
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key_value);

        if self.enable_logging {
            debug!("Using API key {}", mask_key(&self.api_key));
        }

        Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| TaxRateError::configuration(format!("failed to build HTTP client: {}", e)))
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
