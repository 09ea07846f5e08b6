//! Downloading source documents over HTTP.

use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::{Error, Result};

/// Fetches syllabus documents from upstream URLs
#[derive(Debug, Clone)]
pub struct SyllabusFetcher {
    client: Client,
}

impl SyllabusFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::UpstreamFetchFailed {
                status: None,
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// GET `url` and return the body. Any non-2xx status is a failure.
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        debug!("Fetching {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!("Request to {} failed: {}", url, e);
            Error::UpstreamFetchFailed {
                status: None,
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Upstream {} returned {}", url, status);
            return Err(Error::UpstreamFetchFailed {
                status: Some(status.as_u16()),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::UpstreamFetchFailed {
            status: None,
            reason: format!("failed to read body: {e}"),
        })?;
        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
