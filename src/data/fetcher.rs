use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::text;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url} returned status {status}")]
    Status { url: String, status: reqwest::StatusCode },
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Bounded retry without backoff unless `delay` is set.
/// Total attempts are `max_retries + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Runs `op` until it succeeds or the policy is exhausted; returns the last error.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(label, attempt, max_retries = self.max_retries, error = %e, "Request failed, retrying");
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
                Err(e) => {
                    tracing::error!(label, attempts = attempt + 1, error = %e, "Request failed, giving up");
                    return Err(e);
                }
            }
        }
    }
}

/// Where listing pages and spreadsheet files come from.
#[allow(async_fn_in_trait)]
pub trait ListingSource {
    /// Folded page body, or `None` once every attempt failed.
    async fn fetch_page(&self, page_index: u32) -> Option<String>;

    /// Raw bytes of a published spreadsheet.
    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP implementation against the regulator's paginated folder view.
pub struct Fetcher {
    client: reqwest::Client,
    listing_url: String,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(listing_url: &str, retry: RetryPolicy, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            listing_url: listing_url.to_string(),
            retry,
        })
    }

    pub fn page_url(&self, page_index: u32) -> String {
        page_url(&self.listing_url, page_index)
    }

    /// GET `url`, returning the body with diacritics folded to ASCII.
    pub async fn fetch_text(&self, page_index: u32, url: &str) -> Option<String> {
        tracing::debug!(page = page_index, %url, "Requesting listing page");
        let label = format!("page {page_index}");
        match self.retry.run(&label, || get_text(&self.client, url)).await {
            Ok(body) => {
                tracing::debug!(page = page_index, bytes = body.len(), "Listing page received");
                Some(text::fold(&body))
            }
            Err(_) => None,
        }
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::info!(%url, "Downloading spreadsheet");
        self.retry.run(url, || get_bytes(&self.client, url)).await
    }
}

impl ListingSource for Fetcher {
    async fn fetch_page(&self, page_index: u32) -> Option<String> {
        let url = self.page_url(page_index);
        self.fetch_text(page_index, &url).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_bytes(url).await
    }
}

pub fn page_url(base: &str, page_index: u32) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}b_start:int={page_index}")
}

async fn send(client: &reqwest::Client, url: &str) -> Result<reqwest::Response, FetchError> {
    let resp = client.get(url).send().await.map_err(|source| FetchError::Request {
        url: url.to_string(),
        source,
    })?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }
    Ok(resp)
}

async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    send(client, url)
        .await?
        .text()
        .await
        .map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
}

async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let bytes = send(client, url)
        .await?
        .bytes()
        .await
        .map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
    Ok(bytes.to_vec())
}
