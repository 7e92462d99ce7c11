use log::debug;
use serde::de::DeserializeOwned;

use super::params::{AddressQuery, GeoQuery};
use crate::config::ClientConfig;
use crate::error::{Result, TaxRateError};
use crate::http::{HttpTransport, Transport, classify};
use crate::retry::{RetryOverrides, execute_with_retry};

pub const SALES_TAX_PATH: &str = "/request/v60";
pub const ACCOUNT_METRICS_PATH: &str = "/account/v60/metrics";

/// Client for the tax-rate lookup service.
///
/// Every call validates its parameters, then runs the HTTP request under the
/// retry engine; failed attempts are classified before the retry decision.
/// Response bodies are decoded into whatever type the caller asks for.
pub struct TaxRateClient<T: Transport = HttpTransport> {
    transport: T,
    retry: RetryOverrides,
    enable_logging: bool,
}

impl TaxRateClient<HttpTransport> {
    /// Builds a reqwest-backed client from a validated config.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = config.build_http_client()?;
        let transport = HttpTransport::new(client, config.base_url.clone());
        Ok(Self {
            transport,
            retry: config.retry,
            enable_logging: config.enable_logging,
        })
    }

    /// Builds a client from `TAXRATE_API_KEY` and `TAXRATE_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }
}

impl<T: Transport> TaxRateClient<T> {
    /// Uses a caller-supplied transport with the given client-wide retry settings.
    pub fn with_transport(transport: T, retry: RetryOverrides) -> Result<Self> {
        retry.clone().into_policy()?;
        Ok(Self {
            transport,
            retry,
            enable_logging: false,
        })
    }

    /// Enables or disables per-request debug logging.
    pub fn with_logging(mut self, enable_logging: bool) -> Self {
        self.enable_logging = enable_logging;
        self
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Looks up rates for a street address.
    #[tracing::instrument(skip(self))]
    pub async fn get_sales_tax_by_address<R: DeserializeOwned>(
        &self,
        query: &AddressQuery,
    ) -> Result<R> {
        self.get_sales_tax_by_address_with_retry(query, RetryOverrides::default())
            .await
    }

    /// Looks up rates for a street address with per-call retry overrides.
    #[tracing::instrument(skip(self, overrides))]
    pub async fn get_sales_tax_by_address_with_retry<R: DeserializeOwned>(
        &self,
        query: &AddressQuery,
        overrides: RetryOverrides,
    ) -> Result<R> {
        query.validate()?;
        self.request(SALES_TAX_PATH, query.to_query(), overrides)
            .await
    }

    /// Looks up rates for a latitude/longitude pair.
    #[tracing::instrument(skip(self))]
    pub async fn get_sales_tax_by_geolocation<R: DeserializeOwned>(
        &self,
        query: &GeoQuery,
    ) -> Result<R> {
        self.get_sales_tax_by_geolocation_with_retry(query, RetryOverrides::default())
            .await
    }

    /// Looks up rates for a latitude/longitude pair with per-call retry overrides.
    #[tracing::instrument(skip(self, overrides))]
    pub async fn get_sales_tax_by_geolocation_with_retry<R: DeserializeOwned>(
        &self,
        query: &GeoQuery,
        overrides: RetryOverrides,
    ) -> Result<R> {
        query.validate()?;
        self.request(SALES_TAX_PATH, query.to_query(), overrides)
            .await
    }

    /// Fetches account usage metrics.
    #[tracing::instrument(skip(self))]
    pub async fn get_account_metrics<R: DeserializeOwned>(&self) -> Result<R> {
        self.get_account_metrics_with_retry(RetryOverrides::default())
            .await
    }

    /// Fetches account usage metrics with per-call retry overrides.
    #[tracing::instrument(skip(self, overrides))]
    pub async fn get_account_metrics_with_retry<R: DeserializeOwned>(
        &self,
        overrides: RetryOverrides,
    ) -> Result<R> {
        self.request(ACCOUNT_METRICS_PATH, Vec::new(), overrides)
            .await
    }

    async fn request<R: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
        overrides: RetryOverrides,
    ) -> Result<R> {
        let policy = self.retry.clone().merge(overrides).into_policy()?;
        if self.enable_logging {
            debug!("GET {} with {:?} ({:?})", path, query, policy);
        }

        let transport = &self.transport;
        let query = query.as_slice();
        let body = execute_with_retry(
            || async move { transport.get(path, query).await.map_err(classify) },
            &policy,
        )
        .await?;

        serde_json::from_str(&body).map_err(|e| {
            TaxRateError::other(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{FailedResponse, MockTransport, TransportFailure};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn fast_retry(max_attempts: u32) -> RetryOverrides {
        RetryOverrides {
            max_attempts: Some(max_attempts),
            initial_delay: Some(Duration::from_millis(1)),
            ..Default::default()
        }
    }

    fn status(code: u16, body: Value) -> TransportFailure {
        TransportFailure::with_response(FailedResponse::new(code, body))
    }

    #[tokio::test]
    async fn test_address_lookup_success() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .withf(|path, query| {
                path == SALES_TAX_PATH
                    && query.contains(&("address".to_string(), "1 Main St".to_string()))
            })
            .times(1)
            .returning(|_, _| Ok(r#"{"rCode": 100, "results": []}"#.to_string()));

        let client = TaxRateClient::with_transport(transport, RetryOverrides::default()).unwrap();
        let result: Value = client
            .get_sales_tax_by_address(&AddressQuery::new("1 Main St"))
            .await
            .unwrap();

        assert_eq!(result["rCode"], 100);
    }

    #[tokio::test]
    async fn test_validation_error_skips_transport() {
        let mut transport = MockTransport::new();
        transport.expect_get().times(0);

        let client = TaxRateClient::with_transport(transport, RetryOverrides::default()).unwrap();
        let result: Result<Value> = client
            .get_sales_tax_by_geolocation(&GeoQuery::new(120.0, 0.0))
            .await;

        assert!(matches!(result, Err(TaxRateError::Validation { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_are_retried_until_success() {
        let mut transport = MockTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_get()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(status(503, json!("unavailable"))));
        transport
            .expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(r#"{"requests": 12}"#.to_string()));

        let client = TaxRateClient::with_transport(transport, RetryOverrides::default()).unwrap();
        let result: Value = client.get_account_metrics().await.unwrap();

        assert_eq!(result, json!({"requests": 12}));
    }

    #[tokio::test]
    async fn test_network_errors_exhaust_attempts() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .times(2)
            .returning(|_, _| Err(TransportFailure::no_response("connection refused")));

        let client = TaxRateClient::with_transport(transport, fast_retry(2)).unwrap();
        let result: Result<Value> = client.get_account_metrics().await;

        assert_eq!(
            result.unwrap_err(),
            TaxRateError::network("connection refused")
        );
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .times(1)
            .returning(|_, _| Err(status(400, json!({"message": "Invalid address"}))));

        let client = TaxRateClient::with_transport(transport, fast_retry(3)).unwrap();
        let err = client
            .get_sales_tax_by_address::<Value>(&AddressQuery::new("nowhere"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.message(), "Invalid address");
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_retry_after() {
        let mut transport = MockTransport::new();
        transport.expect_get().times(1).returning(|_, _| {
            Err(TransportFailure::with_response(
                FailedResponse::new(429, Value::Null).with_header("retry-after", "60"),
            ))
        });

        let client = TaxRateClient::with_transport(transport, fast_retry(3)).unwrap();
        let err = client
            .get_account_metrics::<Value>()
            .await
            .unwrap_err();

        assert_eq!(err.retry_after(), Some(60));
    }

    #[tokio::test]
    async fn test_per_call_overrides_win() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .times(1)
            .returning(|_, _| Err(status(500, Value::Null)));

        let client = TaxRateClient::with_transport(transport, fast_retry(5)).unwrap();
        let overrides = RetryOverrides {
            max_attempts: Some(1),
            ..Default::default()
        };
        let err = client
            .get_account_metrics_with_retry::<Value>(overrides)
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(500));
    }

    #[tokio::test]
    async fn test_invalid_json_body_is_not_retried() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .times(1)
            .returning(|_, _| Ok("<html>".to_string()));

        let client = TaxRateClient::with_transport(transport, fast_retry(3)).unwrap();
        let err = client.get_account_metrics::<Value>().await.unwrap_err();

        assert!(matches!(err, TaxRateError::Other { .. }));
    }

    #[test]
    fn test_with_transport_logging_toggle() {
        let client =
            TaxRateClient::with_transport(MockTransport::new(), RetryOverrides::default()).unwrap();
        assert!(!client.enable_logging);

        let client = client.with_logging(true);
        assert!(client.enable_logging);
    }

    #[test_log::test(tokio::test)]
    async fn test_logging_enabled_client_still_requests() {
        let mut transport = MockTransport::new();
        transport
            .expect_get()
            .times(1)
            .returning(|_, _| Ok(r#"{"requests": 3}"#.to_string()));

        let client = TaxRateClient::with_transport(transport, RetryOverrides::default())
            .unwrap()
            .with_logging(true);
        let result: Value = client.get_account_metrics().await.unwrap();

        assert_eq!(result, json!({"requests": 3}));
    }

    #[test]
    fn test_new_rejects_malformed_base_url() {
        let result = TaxRateClient::new(ClientConfig::new("key").with_base_url("not a url"));
        assert!(matches!(result, Err(TaxRateError::Configuration { .. })));
    }

    #[test]
    fn test_with_transport_rejects_invalid_retry() {
        let result = TaxRateClient::with_transport(MockTransport::new(), fast_retry(0));
        assert!(matches!(result, Err(TaxRateError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_http_client_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/request/v60")
            .match_header("x-api-key", "test-key")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("lat".into(), "33.5".into()),
                mockito::Matcher::UrlEncoded("lng".into(), "-117.25".into()),
                mockito::Matcher::UrlEncoded("format".into(), "json".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"rCode": 100}"#)
            .create_async()
            .await;

        let client = TaxRateClient::new(ClientConfig::new("test-key").with_base_url(url)).unwrap();
        let result: Value = client
            .get_sales_tax_by_geolocation(&GeoQuery::new(33.5, -117.25))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, json!({"rCode": 100}));
    }
}
