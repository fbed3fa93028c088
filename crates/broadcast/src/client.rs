//! REST client for the broadcast metadata API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use score_core::{Category, Error, LiveStream, Recording, Result, SourceErrorCode};
use serde::de::DeserializeOwned;
use telemetry::{health, metrics};
use tracing::{debug, warn};
use url::Url;

use crate::config::SourceConfig;
use crate::source::BroadcastSource;
use crate::types::{GameRecord, Page, StreamRecord, VideoRecord};

/// Maximum cached categories.
const CATEGORY_CACHE_MAX_CAPACITY: u64 = 1_000;

const RATELIMIT_REMAINING_HEADER: &str = "ratelimit-remaining";

/// Metadata client.
///
/// Category lookups are cached since a broadcast rarely switches category
/// and the same few IDs are resolved over and over.
#[derive(Clone)]
pub struct HelixClient {
    base_url: Url,
    http_client: reqwest::Client,
    categories: Cache<String, Category>,
    rate_limit_warn_below: u32,
}

impl HelixClient {
    /// Creates a new client.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| Error::config(format!("invalid api_url {}: {}", config.api_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "Client-Id",
            HeaderValue::from_str(&config.client_id)
                .map_err(|e| Error::config(format!("invalid client_id: {}", e)))?,
        );
        if let Some(token) = &config.access_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::config(format!("invalid access_token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            http_client,
            categories: Cache::builder()
                .max_capacity(CATEGORY_CACHE_MAX_CAPACITY)
                .time_to_live(Duration::from_secs(config.category_cache_ttl_secs))
                .build(),
            rate_limit_warn_below: config.rate_limit_warn_below,
        })
    }

    /// GETs one page of an endpoint.
    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Page<T>> {
        let url = self.base_url.join(endpoint).map_err(|e| {
            Error::source(SourceErrorCode::RequestFailed, format!("bad endpoint {}: {}", endpoint, e))
        })?;

        debug!(url = %url, "Calling metadata API");
        let start = Instant::now();

        let response = self
            .http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.failed(endpoint, e.to_string()))?;

        metrics()
            .metadata_latency_ms
            .observe(start.elapsed().as_millis() as u64);
        self.check_rate_limit(response.headers());

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.failed(endpoint, format!("status {}: {}", status, body)));
        }

        let page = response.json::<Page<T>>().await.map_err(|e| {
            metrics().metadata_errors.inc();
            Error::source(
                SourceErrorCode::InvalidResponse,
                format!("{}: {}", endpoint, e),
            )
        })?;

        health().metadata.set_healthy();
        Ok(page)
    }

    fn failed(&self, endpoint: &str, reason: String) -> Error {
        warn!(endpoint = endpoint, error = %reason, "Metadata request failed");
        metrics().metadata_errors.inc();
        health().metadata.set_unhealthy(reason.clone());
        Error::source(
            SourceErrorCode::RequestFailed,
            format!("{}: {}", endpoint, reason),
        )
    }

    fn check_rate_limit(&self, headers: &HeaderMap) {
        let remaining = headers
            .get(RATELIMIT_REMAINING_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());

        if let Some(remaining) = remaining {
            if remaining < self.rate_limit_warn_below {
                warn!(remaining = remaining, "Metadata API rate limit nearly exhausted");
            }
        }
    }
}

#[async_trait]
impl BroadcastSource for HelixClient {
    async fn live_stream(&self, broadcaster_id: &str) -> Result<Option<LiveStream>> {
        let page: Page<StreamRecord> = self
            .fetch("streams", &[("user_id", broadcaster_id)])
            .await?;
        Ok(page.first().map(LiveStream::from))
    }

    async fn latest_recording(&self, broadcaster_id: &str) -> Result<Option<Recording>> {
        let page: Page<VideoRecord> = self
            .fetch("videos", &[("user_id", broadcaster_id), ("first", "1")])
            .await?;
        Ok(page.first().map(Recording::from))
    }

    async fn category(&self, category_id: &str) -> Result<Option<Category>> {
        if let Some(cached) = self.categories.get(category_id).await {
            debug!(category_id = category_id, "Category cache hit");
            return Ok(Some(cached));
        }

        let page: Page<GameRecord> = self.fetch("games", &[("id", category_id)]).await?;
        let category = page.first().map(Category::from);

        if let Some(category) = &category {
            self.categories
                .insert(category_id.to_string(), category.clone())
                .await;
        }
        Ok(category)
    }
}
