//! Client for the remote fetcher (browser-as-a-service).
//!
//! The fetcher renders pages on our behalf and delivers results
//! asynchronously to our webhook; the synchronous submission call only
//! acknowledges that the request was accepted.

pub mod correlation;

pub use correlation::{CorrelationId, SELFTEST_ID};

use crate::error::Result as CrateResult;
use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Submit-side timeout; a fetcher that cannot even accept the request in
/// this window is treated as a transient failure of the item.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for downloading a result payload from the fetcher's storage.
const PAYLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    #[error("fetcher request timed out")]
    Timeout,
    #[error("fetcher transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("fetcher rejected submission: HTTP {0}")]
    Status(StatusCode),
}

impl From<reqwest::Error> for FetcherError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e)
        }
    }
}

/// HTTP client for the fetcher's submission API.
pub struct FetcherClient {
    client: Client,
    base_url: String,
    api_key: String,
    webhook_url: String,
}

impl FetcherClient {
    /// Creates a new fetcher client.
    ///
    /// `webhook_base_url` is our public origin; the callback path is
    /// appended here so every submission carries the full webhook URL.
    pub fn new(base_url: &str, api_key: &str, webhook_base_url: &str) -> CrateResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("prospector/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(PAYLOAD_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            webhook_url: format!(
                "{}/crawl/webhook",
                webhook_base_url.trim_end_matches('/')
            ),
        })
    }

    /// Submit a URL for rendering, tagged with a correlation id.
    ///
    /// Only transport-level acceptance is confirmed here; the actual page
    /// result arrives later on the webhook. The client never retries — the
    /// caller routes failures into the queue's retry path.
    pub async fn submit(&self, url: &str, correlation_id: &str) -> Result<(), FetcherError> {
        let endpoint = format!("{}/v1/requests", self.base_url);
        let body = json!({
            "url": url,
            "post_id": correlation_id,
            "webhook_url": self.webhook_url,
            "render_js": true,
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .timeout(SUBMIT_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetcherError::Status(status));
        }

        debug!(url, correlation_id, "submitted to fetcher");
        Ok(())
    }

    /// Download the bytes of a result payload hosted by the fetcher.
    pub async fn fetch_payload(&self, payload_url: &str) -> Result<Vec<u8>, FetcherError> {
        let response = self
            .client
            .get(payload_url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetcherError::Status(status));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Post a self-test through the fetcher targeting our own webhook origin.
    ///
    /// When the callback comes back, the webhook handler marks the `webhook`
    /// service status `Connected`. A misconfigured public URL otherwise fails
    /// silently: jobs submit and no callback ever arrives.
    pub async fn submit_selftest(&self, webhook_base_url: &str) -> Result<(), FetcherError> {
        self.submit(&format!("{}/health", webhook_base_url.trim_end_matches('/')), SELFTEST_ID)
            .await
    }
}
