//! Maps raw transport failures into [`TaxRateError`] variants.

use std::collections::HashMap;

use log::debug;
use serde_json::Value;

use crate::error::TaxRateError;

const AUTHENTICATION_FAILED: &str = "Authentication failed. Please check your API key.";
const RATE_LIMIT_EXCEEDED: &str = "Rate limit exceeded.";

/// A non-success HTTP response, already drained.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedResponse {
    pub status: u16,
    /// Parsed JSON when the body was JSON, a JSON string otherwise, `Null` when empty.
    pub body: Value,
    /// Header names are stored lowercased.
    pub headers: HashMap<String, String>,
}

impl FailedResponse {
    /// Creates a response with the given status and body and no headers.
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: HashMap::new(),
        }
    }

    /// Adds a header; the name is lowercased.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Normalized shape of a failed HTTP call, independent of the transport crate.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportFailure {
    pub response: Option<FailedResponse>,
    pub message: String,
}

impl TransportFailure {
    /// A failure where no response was obtained.
    pub fn no_response(message: impl Into<String>) -> Self {
        Self {
            response: None,
            message: message.into(),
        }
    }

    /// A failure carrying an HTTP response.
    pub fn with_response(response: FailedResponse) -> Self {
        let message = format!("HTTP status {}", response.status);
        Self {
            response: Some(response),
            message,
        }
    }

    /// Returns true when the server answered.
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Normalizes a reqwest error. Errors from `send()` carry no response.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        match error.status() {
            Some(status) => Self {
                response: Some(FailedResponse::new(status.as_u16(), Value::Null)),
                message: error.to_string(),
            },
            None => Self::no_response(error.to_string()),
        }
    }

    /// Drains a non-success response into a failure.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = match response.text().await {
            Ok(text) => parse_body(&text),
            Err(e) => {
                debug!("Failed to read error response body: {}", e);
                Value::Null
            }
        };

        Self::with_response(FailedResponse {
            status,
            body,
            headers,
        })
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Classifies one transport failure. Makes no retry decision.
pub fn classify(failure: TransportFailure) -> TaxRateError {
    let Some(response) = failure.response else {
        return TaxRateError::Network {
            message: failure.message,
        };
    };

    let retry_after = parse_retry_after(&response);
    let FailedResponse { status, body, .. } = response;

    match status {
        401 | 403 => TaxRateError::Authentication {
            message: extract_message(&body).unwrap_or_else(|| AUTHENTICATION_FAILED.to_string()),
            status_code: status,
            body,
        },
        429 => TaxRateError::RateLimit {
            message: extract_message(&body).unwrap_or_else(|| RATE_LIMIT_EXCEEDED.to_string()),
            status_code: status,
            body,
            retry_after,
        },
        _ => TaxRateError::Api {
            message: extract_message(&body)
                .unwrap_or_else(|| format!("API request failed with status {}", status)),
            status_code: status,
            body,
        },
    }
}

/// Classifies an arbitrary error value.
///
/// Already-classified errors pass through, reqwest errors are normalized and
/// classified, anything else becomes [`TaxRateError::Other`].
pub fn classify_any(error: anyhow::Error) -> TaxRateError {
    let error = match error.downcast::<TaxRateError>() {
        Ok(classified) => return classified,
        Err(e) => e,
    };
    match error.downcast::<reqwest::Error>() {
        Ok(e) => classify(TransportFailure::from_reqwest_error(&e)),
        Err(e) => TaxRateError::other(format!("{:#}", e)),
    }
}

fn parse_retry_after(response: &FailedResponse) -> Option<u64> {
    response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// A string body is the message; an object body offers `message`, then `error`.
fn extract_message(body: &Value) -> Option<String> {
    match body {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}
