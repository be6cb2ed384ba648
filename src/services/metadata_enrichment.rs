//! Page metadata lookup for links that were saved without a description.
//!
//! Sources are tried in order (scrape service first, then the quota-limited
//! preview service). Enrichment only feeds the AI prompt; it never picks a
//! category by itself.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use reqwest::Client;
use ring::digest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::services::http_client;
use crate::services::state_store::{StateStore, StateStoreExt, KEY_PREVIEW_QUOTA};
use crate::types::errors::EnrichmentError;
use crate::types::settings::ProviderSettings;

pub const LINK_PREVIEW_ENDPOINT: &str = "https://api.linkpreview.net/";
pub const LINK_PREVIEW_HOURLY_LIMIT: u32 = 60;
const QUOTA_WINDOW_MS: i64 = 60 * 60 * 1000;

/// Metadata found for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl PageMetadata {
    pub fn has_description(&self) -> bool {
        self.description.as_deref().is_some_and(|d| !d.trim().is_empty())
    }

    fn is_empty(&self) -> bool {
        !self.has_description()
            && self.title.as_deref().map_or(true, |t| t.trim().is_empty())
            && self.keywords.is_empty()
    }

    /// Reads `{title, description, keywords}` from a loosely shaped JSON body.
    fn from_json(body: &Value) -> Self {
        let text = |key: &str| {
            body.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let keywords = match body.get("keywords") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            _ => Vec::new(),
        };
        Self {
            title: text("title"),
            description: text("description"),
            keywords,
        }
    }
}

/// A place page metadata can be fetched from.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the source is not configured or knows nothing.
    async fn fetch(
        &self,
        url: &str,
        settings: &ProviderSettings,
    ) -> Result<Option<PageMetadata>, EnrichmentError>;
}

/// Runs the configured sources in order.
pub struct MetadataEnricher {
    sources: Vec<Arc<dyn MetadataSource>>,
}

impl MetadataEnricher {
    pub fn new(sources: Vec<Arc<dyn MetadataSource>>) -> Self {
        Self { sources }
    }

    /// Scrape service followed by the preview service, over HTTP.
    pub fn with_http_sources(store: Arc<dyn StateStore>) -> Self {
        Self::new(vec![
            Arc::new(ScrapeServiceClient::new(http_client::metadata_client().clone())),
            Arc::new(LinkPreviewClient::over_http(Some(store))),
        ])
    }

    /// First result carrying a description wins; otherwise the first partial
    /// result (title or keywords only) is returned.
    pub async fn enrich(&self, url: &str, settings: &ProviderSettings) -> Option<PageMetadata> {
        let mut partial: Option<PageMetadata> = None;
        for source in &self.sources {
            match source.fetch(url, settings).await {
                Ok(Some(meta)) if meta.has_description() => {
                    debug!(url, source = source.name(), "metadata enriched");
                    return Some(meta);
                }
                Ok(Some(meta)) if !meta.is_empty() => {
                    partial.get_or_insert(meta);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(url, source = source.name(), error = %e, "metadata source failed");
                }
            }
        }
        partial
    }
}

// ─── Scrape service ───

/// Client for a self-hosted scrape endpoint: `GET {endpoint}?url=<url>`
/// answering `{title, description, keywords}`.
pub struct ScrapeServiceClient {
    client: Client,
}

impl ScrapeServiceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetadataSource for ScrapeServiceClient {
    fn name(&self) -> &'static str {
        "scrape"
    }

    async fn fetch(
        &self,
        url: &str,
        settings: &ProviderSettings,
    ) -> Result<Option<PageMetadata>, EnrichmentError> {
        let endpoint = match settings.scrape_endpoint.as_deref().map(str::trim) {
            Some(e) if !e.is_empty() => e,
            _ => return Ok(None),
        };

        let response = self.client.get(endpoint).query(&[("url", url)]).send().await?;
        if !response.status().is_success() {
            return Err(EnrichmentError::Status(response.status().as_u16()));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| EnrichmentError::Malformed(e.to_string()))?;
        Ok(Some(PageMetadata::from_json(&body)))
    }
}

// ─── Preview service ───

/// Hourly usage window of one preview key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyQuota {
    pub used: u32,
    pub reset_time: i64,
    pub limit: u32,
}

impl KeyQuota {
    fn fresh(now: i64, limit: u32) -> Self {
        Self {
            used: 0,
            reset_time: now + QUOTA_WINDOW_MS,
            limit,
        }
    }
}

/// Per-key quota bookkeeping. Keys are tracked by fingerprint, never in plaintext.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    limit: u32,
    quotas: HashMap<String, KeyQuota>,
}

impl QuotaLedger {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            quotas: HashMap::new(),
        }
    }

    pub fn from_saved(limit: u32, quotas: HashMap<String, KeyQuota>) -> Self {
        Self { limit, quotas }
    }

    pub fn fingerprint(key: &str) -> String {
        let d = digest::digest(&digest::SHA256, key.as_bytes());
        URL_SAFE_NO_PAD.encode(&d.as_ref()[..9])
    }

    fn entry(&mut self, key: &str, now: i64) -> &mut KeyQuota {
        let limit = self.limit;
        let quota = self
            .quotas
            .entry(Self::fingerprint(key))
            .or_insert_with(|| KeyQuota::fresh(now, limit));
        if now > quota.reset_time {
            *quota = KeyQuota::fresh(now, limit);
        }
        quota
    }

    pub fn remaining(&mut self, key: &str, now: i64) -> u32 {
        let quota = self.entry(key, now);
        quota.limit.saturating_sub(quota.used)
    }

    pub fn is_available(&mut self, key: &str, now: i64) -> bool {
        self.remaining(key, now) > 0
    }

    pub fn record_use(&mut self, key: &str, now: i64) {
        let quota = self.entry(key, now);
        quota.used = quota.used.saturating_add(1);
    }

    /// Marks the key as used up until its window resets (e.g. after HTTP 429).
    pub fn exhaust(&mut self, key: &str, now: i64) {
        let quota = self.entry(key, now);
        quota.used = quota.limit;
    }

    pub fn snapshot(&self) -> HashMap<String, KeyQuota> {
        self.quotas.clone()
    }
}

/// One preview request with one key.
#[async_trait]
pub trait PreviewTransport: Send + Sync {
    async fn fetch_with_key(&self, url: &str, api_key: &str) -> Result<PageMetadata, EnrichmentError>;
}

/// `GET https://api.linkpreview.net/?q=<url>` with the key in `X-Linkpreview-Api-Key`.
pub struct HttpPreviewTransport {
    client: Client,
    endpoint: String,
}

impl HttpPreviewTransport {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl PreviewTransport for HttpPreviewTransport {
    async fn fetch_with_key(&self, url: &str, api_key: &str) -> Result<PageMetadata, EnrichmentError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", url)])
            .header("X-Linkpreview-Api-Key", api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EnrichmentError::Status(response.status().as_u16()));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| EnrichmentError::Malformed(e.to_string()))?;
        Ok(PageMetadata::from_json(&body))
    }
}

/// Preview service with per-key hourly quotas and key rotation.
pub struct LinkPreviewClient {
    transport: Arc<dyn PreviewTransport>,
    ledger: Mutex<QuotaLedger>,
    cursor: AtomicUsize,
    store: Option<Arc<dyn StateStore>>,
}

impl LinkPreviewClient {
    pub fn new(transport: Arc<dyn PreviewTransport>, store: Option<Arc<dyn StateStore>>) -> Self {
        let saved: HashMap<String, KeyQuota> = store
            .as_ref()
            .and_then(|s| match s.load(KEY_PREVIEW_QUOTA) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "preview quota unreadable, starting fresh");
                    None
                }
            })
            .unwrap_or_default();
        Self {
            transport,
            ledger: Mutex::new(QuotaLedger::from_saved(LINK_PREVIEW_HOURLY_LIMIT, saved)),
            cursor: AtomicUsize::new(0),
            store,
        }
    }

    pub fn over_http(store: Option<Arc<dyn StateStore>>) -> Self {
        let transport = HttpPreviewTransport::new(
            http_client::metadata_client().clone(),
            LINK_PREVIEW_ENDPOINT,
        );
        Self::new(Arc::new(transport), store)
    }

    fn ledger(&self) -> MutexGuard<'_, QuotaLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remaining requests for `key` in its current window.
    pub fn remaining_quota(&self, key: &str) -> u32 {
        self.ledger().remaining(key, Utc::now().timestamp_millis())
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            let snapshot = self.ledger().snapshot();
            if let Err(e) = store.save(KEY_PREVIEW_QUOTA, &snapshot) {
                warn!(error = %e, "failed to persist preview quota");
            }
        }
    }
}

#[async_trait]
impl MetadataSource for LinkPreviewClient {
    fn name(&self) -> &'static str {
        "linkpreview"
    }

    async fn fetch(
        &self,
        url: &str,
        settings: &ProviderSettings,
    ) -> Result<Option<PageMetadata>, EnrichmentError> {
        let keys: Vec<&str> = settings
            .link_preview_keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Ok(None);
        }

        let start = self.cursor.load(Ordering::Relaxed) % keys.len();
        let mut last_error = EnrichmentError::QuotaExhausted;

        for offset in 0..keys.len() {
            let index = (start + offset) % keys.len();
            let key = keys[index];
            let now = Utc::now().timestamp_millis();
            if !self.ledger().is_available(key, now) {
                debug!(key_index = index, "preview key out of quota, rotating");
                continue;
            }

            match self.transport.fetch_with_key(url, key).await {
                Ok(meta) => {
                    self.ledger().record_use(key, Utc::now().timestamp_millis());
                    self.cursor.store(index, Ordering::Relaxed);
                    self.persist();
                    return Ok(Some(meta));
                }
                Err(EnrichmentError::Status(429)) => {
                    info!(key_index = index, "preview key rate limited, rotating");
                    self.ledger().exhaust(key, Utc::now().timestamp_millis());
                    self.persist();
                    last_error = EnrichmentError::Status(429);
                }
                Err(e) => {
                    warn!(key_index = index, error = %e, "preview request failed, rotating");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
