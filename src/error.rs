//! Error taxonomy shared by the classifier, the retry engine and the client.

use serde_json::Value;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, TaxRateError>;

/// A classified failure.
///
/// Exactly one variant describes each failure. The API-kind variants
/// (`Authentication`, `RateLimit`, `Api`) always carry the HTTP status code
/// and the raw response body.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaxRateError {
    /// The request never produced a response (DNS, connect, timeout, TLS...).
    #[error("Network error: {message}")]
    Network { message: String },

    /// HTTP 401 or 403.
    #[error("{message}")]
    Authentication {
        message: String,
        status_code: u16,
        body: Value,
    },

    /// HTTP 429.
    #[error("{message}")]
    RateLimit {
        message: String,
        status_code: u16,
        body: Value,
        /// Seconds the server asked us to wait, from the `retry-after` header.
        retry_after: Option<u64>,
    },

    /// Any other non-success HTTP status.
    #[error("{message}")]
    Api {
        message: String,
        status_code: u16,
        body: Value,
    },

    /// Caller input rejected before any request was sent.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Invalid client or retry configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The retry loop ended without returning a value or an error.
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: Box<TaxRateError>,
    },

    /// A failure that did not come from the transport at all.
    #[error("{message}")]
    Other { message: String },
}

impl TaxRateError {
    /// Creates a network error (no response was obtained).
    pub fn network(message: impl Into<String>) -> Self {
        TaxRateError::Network {
            message: message.into(),
        }
    }

    /// Creates a validation error for rejected caller input.
    pub fn validation(message: impl Into<String>) -> Self {
        TaxRateError::Validation {
            message: message.into(),
        }
    }

    /// Creates a configuration error for invalid client or retry settings.
    pub fn configuration(message: impl Into<String>) -> Self {
        TaxRateError::Configuration {
            message: message.into(),
        }
    }

    /// Creates an error for failures outside the transport.
    pub fn other(message: impl Into<String>) -> Self {
        TaxRateError::Other {
            message: message.into(),
        }
    }

    /// HTTP status code for API-kind errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TaxRateError::Authentication { status_code, .. }
            | TaxRateError::RateLimit { status_code, .. }
            | TaxRateError::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Raw response body for API-kind errors.
    pub fn response_body(&self) -> Option<&Value> {
        match self {
            TaxRateError::Authentication { body, .. }
            | TaxRateError::RateLimit { body, .. }
            | TaxRateError::Api { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Retry hint in seconds, only ever present on rate limit errors.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            TaxRateError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns true for errors that carry an HTTP status code.
    pub fn is_api_error(&self) -> bool {
        self.status_code().is_some()
    }

    /// Human-readable message; for exhausted retries, the last error's message.
    pub fn message(&self) -> &str {
        match self {
            TaxRateError::Network { message }
            | TaxRateError::Authentication { message, .. }
            | TaxRateError::RateLimit { message, .. }
            | TaxRateError::Api { message, .. }
            | TaxRateError::Validation { message }
            | TaxRateError::Configuration { message }
            | TaxRateError::Other { message } => message,
            TaxRateError::RetryExhausted { last_error, .. } => last_error.message(),
        }
    }
}
