// Trending feed HTTP client.
// Handles timeouts, retries of transient failures, and response status checks.

use std::time::Duration;

use reqwest::{
    Client, Response,
    header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::error::{GtrendError, Result};

/// HTTP client for the trending feed.
#[derive(Debug, Clone)]
pub struct TrendingClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl TrendingClient {
    /// Create a client from upstream settings.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("gtrend"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(GtrendError::Api)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        })
    }

    /// Get the base URL requests are made against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a GET request with query parameters and return the response body.
    ///
    /// Transient failures are retried, including a timeout while the body is
    /// still being read.
    pub async fn get_with_params<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &T,
    ) -> Result<String> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut attempt = 0;

        loop {
            match self.get_once(&url, params).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(url = %url, attempt, error = %e, "retrying trending request");
                    tokio::time::sleep(self.retry_delay).await;
                }
                result => return result,
            }
        }
    }

    async fn get_once<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        params: &T,
    ) -> Result<String> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(GtrendError::Api)?;

        let response = self.check_response(response).await?;
        response.text().await.map_err(GtrendError::Api)
    }

    /// Check response status and convert errors.
    async fn check_response(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(GtrendError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}
