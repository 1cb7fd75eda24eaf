// src/utils/http.rs

//! Retrying HTTP fetch layer.
//!
//! Wraps a shared `reqwest::Client`. Connection-level failures are
//! retried with exponential backoff; HTTP error statuses are returned
//! to the caller unchanged so policy stays upstream.

use std::time::Duration;

use reqwest::{Client, Method, Response};
use scraper::Html;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// Retrying HTTP client used by the paginator, the plugins and the
/// download stage. Cheap to clone; the inner client is shared.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_retries: u32,
    backoff_ms: u64,
}

impl Fetcher {
    /// Build a fetcher from the crawler configuration.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries.max(1),
            backoff_ms: config.retry_backoff_ms,
        })
    }

    /// GET a URL with bounded retries on connection failures.
    pub async fn fetch(&self, url: &str) -> Result<Response> {
        self.fetch_with_method(Method::GET, url).await
    }

    /// Issue a request with bounded retries on connection failures.
    ///
    /// Attempt `i` (0-indexed) sleeps `backoff_ms * 2^i` before the next
    /// try. Exhausting all attempts yields `ConnectionFailed` so callers
    /// can tell "no response" from other request errors. Responses with
    /// error statuses are returned as ordinary responses.
    pub async fn fetch_with_method(&self, method: Method, url: &str) -> Result<Response> {
        for attempt in 0..self.max_retries {
            log::debug!("{} '{}' (attempt {})", method, url, attempt + 1);
            match self.client.request(method.clone(), url).send().await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_connect() || err.is_timeout() => {
                    log::warn!("Connection error for '{}': {} (attempt {})", url, err, attempt + 1);
                    if attempt + 1 < self.max_retries {
                        let delay = self.backoff_ms.saturating_mul(1u64 << attempt.min(16));
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::ConnectionFailed {
            url: url.to_string(),
            attempts: self.max_retries,
        })
    }

    /// Fetch a page and parse it as HTML.
    ///
    /// Unlike [`fetch`](Self::fetch), a non-success status is an error
    /// here: callers of this helper want page content or nothing.
    pub async fn fetch_page(&self, url: &str) -> Result<Html> {
        let text = self.fetch(url).await?.error_for_status()?.text().await?;
        Ok(Html::parse_document(&text))
    }
}
