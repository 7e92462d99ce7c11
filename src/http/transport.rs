//! HTTP transport used by the client. One call, no retries.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;

use super::classify::TransportFailure;

/// Performs a single GET and hands back the raw success body.
///
/// Implementations normalize every failure (no response, or a non-2xx
/// response) into a [`TransportFailure`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<String, TransportFailure>;
}

/// reqwest-backed [`Transport`].
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Wraps the given reqwest Client. Paths are appended to `base_url`.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(skip(self, query))]
    async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<String, TransportFailure> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}...", url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| TransportFailure::from_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(TransportFailure::from_response(response).await);
        }

        response.text().await.map_err(|e| {
            TransportFailure::no_response(format!("Failed to read response body: {}", e))
        })
    }
}
