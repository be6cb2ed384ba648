//! URL-keyed, lockable classification cache.
//!
//! Reads and writes hit an in-memory mirror loaded at construction. Changes are
//! written back to the [`StateStore`] by a debounced background flush.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use ring::digest;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::services::domain_dictionary;
use crate::services::state_store::{StateStore, StateStoreExt, KEY_CLASSIFICATIONS, KEY_DOMAIN_STATS};
use crate::types::classification::{
    BookmarkClassification, CacheSnapshot, CacheStats, ClassificationSource, DomainStats,
    CACHE_SCHEMA_VERSION,
};
use crate::types::errors::StoreError;

/// Unlocked records older than this are dropped.
pub const DEFAULT_RETENTION_DAYS: i64 = 365;

/// AI confidence at or above which a record locks itself.
pub const AUTO_LOCK_CONFIDENCE: f64 = 0.8;

const FLUSH_DELAY: Duration = Duration::from_millis(100);

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// `"h"` + URL-safe base64 of the first 12 bytes of SHA-256(url).
pub fn url_hash(url: &str) -> String {
    let d = digest::digest(&digest::SHA256, url.as_bytes());
    format!("h{}", URL_SAFE_NO_PAD.encode(&d.as_ref()[..12]))
}

fn stats_domain(url: &str) -> String {
    domain_dictionary::hostname(url).unwrap_or_else(|| "unknown".to_string())
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, BookmarkClassification>,
    domain_stats: HashMap<String, DomainStats>,
    hits: u64,
    misses: u64,
}

struct CacheShared {
    store: Arc<dyn StateStore>,
    state: Mutex<CacheState>,
    flush_scheduled: AtomicBool,
}

impl CacheShared {
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_through(&self) -> Result<(), StoreError> {
        let (mut entries, mut stats) = {
            let state = self.state();
            (
                state.entries.values().cloned().collect::<Vec<_>>(),
                state.domain_stats.values().cloned().collect::<Vec<_>>(),
            )
        };
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.url.cmp(&b.url)));
        stats.sort_by(|a, b| a.domain.cmp(&b.domain));

        self.store.save(KEY_CLASSIFICATIONS, &entries)?;
        self.store.save(KEY_DOMAIN_STATS, &stats)?;
        debug!(records = entries.len(), domains = stats.len(), "classification cache flushed");
        Ok(())
    }
}

/// Persistent classification cache keyed by full URL.
pub struct ClassificationCache {
    shared: Arc<CacheShared>,
    retention_ms: i64,
}

impl ClassificationCache {
    pub fn new(store: Arc<dyn StateStore>) -> Result<Self, StoreError> {
        Self::with_retention_days(store, DEFAULT_RETENTION_DAYS)
    }

    /// Loads the mirror from `store`, skipping unlocked records past retention.
    pub fn with_retention_days(store: Arc<dyn StateStore>, days: i64) -> Result<Self, StoreError> {
        let retention_ms = days.max(0) * MILLIS_PER_DAY;
        let now = Utc::now().timestamp_millis();

        let records: Vec<BookmarkClassification> = store.load(KEY_CLASSIFICATIONS)?.unwrap_or_default();
        let stats: Vec<DomainStats> = store.load(KEY_DOMAIN_STATS)?.unwrap_or_default();

        let mut state = CacheState::default();
        let mut expired = 0usize;
        for mut record in records {
            if !record.locked && now - record.timestamp >= retention_ms {
                expired += 1;
                continue;
            }
            record.url_hash = url_hash(&record.url);
            state.entries.insert(record.url_hash.clone(), record);
        }
        for stat in stats {
            state.domain_stats.insert(stat.domain.clone(), stat);
        }
        info!(records = state.entries.len(), expired, "classification cache loaded");

        Ok(Self {
            shared: Arc::new(CacheShared {
                store,
                state: Mutex::new(state),
                flush_scheduled: AtomicBool::new(false),
            }),
            retention_ms,
        })
    }

    /// Returns the record for `url`, bumping `last_used` and the hit counter.
    pub fn get(&self, url: &str) -> Option<BookmarkClassification> {
        let key = url_hash(url);
        let mut state = self.shared.state();
        match state.entries.get_mut(&key) {
            Some(record) => {
                record.last_used = Utc::now().timestamp_millis();
                let found = record.clone();
                state.hits += 1;
                debug!(url, category = %found.category, locked = found.locked, "cache hit");
                Some(found)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Like [`get`](Self::get) but without touching statistics.
    pub fn peek(&self, url: &str) -> Option<BookmarkClassification> {
        self.shared.state().entries.get(&url_hash(url)).cloned()
    }

    /// Stores a classification. Returns `false` when the write was rejected
    /// because the existing record is locked and `source` is not manual.
    ///
    /// Without an explicit `lock`, manual writes and AI answers at or above
    /// [`AUTO_LOCK_CONFIDENCE`] lock themselves. Enrichment answers never do.
    pub fn set(
        &self,
        url: &str,
        category: &str,
        confidence: f64,
        source: ClassificationSource,
        lock: Option<bool>,
    ) -> bool {
        let key = url_hash(url);
        let now = Utc::now().timestamp_millis();
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        let locked = lock.unwrap_or_else(|| match source {
            ClassificationSource::Manual => true,
            ClassificationSource::Ai => confidence >= AUTO_LOCK_CONFIDENCE,
            ClassificationSource::Enrichment | ClassificationSource::Dictionary => false,
        });

        {
            let mut state = self.shared.state();
            let first_seen = match state.entries.get(&key) {
                Some(existing) if existing.locked && source != ClassificationSource::Manual => {
                    warn!(
                        url,
                        current = %existing.category,
                        rejected = category,
                        source = source.as_str(),
                        "classification is locked, automatic update skipped"
                    );
                    return false;
                }
                Some(existing) => existing.timestamp,
                None => now,
            };

            state.entries.insert(
                key.clone(),
                BookmarkClassification {
                    url: url.to_string(),
                    url_hash: key,
                    category: category.to_string(),
                    confidence,
                    timestamp: first_seen,
                    last_used: now,
                    source,
                    locked,
                    version: CACHE_SCHEMA_VERSION,
                },
            );

            let domain = stats_domain(url);
            let stats = state
                .domain_stats
                .entry(domain.clone())
                .or_insert_with(|| DomainStats {
                    domain,
                    total_bookmarks: 0,
                    categories: HashMap::new(),
                    last_updated: now,
                });
            stats.total_bookmarks += 1;
            *stats.categories.entry(category.to_string()).or_insert(0) += 1;
            stats.last_updated = now;
        }

        debug!(url, category, confidence, locked, source = source.as_str(), "classification cached");
        self.schedule_flush();
        true
    }

    /// Marks the record as user-confirmed: locked, manual, confidence 1.0.
    pub fn lock(&self, url: &str) -> bool {
        let changed = {
            let mut state = self.shared.state();
            match state.entries.get_mut(&url_hash(url)) {
                Some(record) => {
                    record.locked = true;
                    record.source = ClassificationSource::Manual;
                    record.confidence = 1.0;
                    info!(url, category = %record.category, "classification locked");
                    true
                }
                None => {
                    warn!(url, "cannot lock: no cached classification");
                    false
                }
            }
        };
        if changed {
            self.schedule_flush();
        }
        changed
    }

    pub fn unlock(&self, url: &str) -> bool {
        let changed = {
            let mut state = self.shared.state();
            match state.entries.get_mut(&url_hash(url)) {
                Some(record) => {
                    record.locked = false;
                    true
                }
                None => false,
            }
        };
        if changed {
            info!(url, "classification unlocked");
            self.schedule_flush();
        }
        changed
    }

    /// Removes one unlocked record. Locked records stay.
    pub fn clear_url(&self, url: &str) -> bool {
        let key = url_hash(url);
        let removed = {
            let mut state = self.shared.state();
            match state.entries.get(&key) {
                Some(record) if record.locked => {
                    warn!(url, "classification is locked, not cleared");
                    false
                }
                Some(_) => state.entries.remove(&key).is_some(),
                None => false,
            }
        };
        if removed {
            self.schedule_flush();
        }
        removed
    }

    /// Removes every unlocked record sharing the hostname of `url`.
    pub fn clear_for_domain(&self, url: &str) -> usize {
        let domain = stats_domain(url);
        let removed = {
            let mut state = self.shared.state();
            let before = state.entries.len();
            state
                .entries
                .retain(|_, record| record.locked || stats_domain(&record.url) != domain);
            before - state.entries.len()
        };
        if removed > 0 {
            info!(domain = %domain, removed, "cleared unlocked classifications for domain");
            self.schedule_flush();
        }
        removed
    }

    /// Drops unlocked records past the retention window.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now().timestamp_millis())
    }

    pub fn evict_expired_at(&self, now_ms: i64) -> usize {
        let retention = self.retention_ms;
        let removed = {
            let mut state = self.shared.state();
            let before = state.entries.len();
            state
                .entries
                .retain(|_, record| record.locked || now_ms - record.timestamp < retention);
            before - state.entries.len()
        };
        if removed > 0 {
            info!(removed, "expired classifications evicted");
            self.schedule_flush();
        }
        removed
    }

    pub fn domain_stats(&self, domain: &str) -> Option<DomainStats> {
        self.shared.state().domain_stats.get(domain).cloned()
    }

    /// All domain statistics, busiest first.
    pub fn all_domain_stats(&self) -> Vec<DomainStats> {
        let mut stats: Vec<DomainStats> = self.shared.state().domain_stats.values().cloned().collect();
        stats.sort_by(|a, b| {
            b.total_bookmarks
                .cmp(&a.total_bookmarks)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        stats
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state();
        let total = state.entries.len();
        let locked = state.entries.values().filter(|r| r.locked).count();
        let lookups = state.hits + state.misses;
        let hit_rate = if lookups > 0 {
            (state.hits as f64 / lookups as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        CacheStats {
            total,
            locked,
            unlocked: total - locked,
            hits: state.hits,
            misses: state.misses,
            hit_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.shared.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn export(&self) -> CacheSnapshot {
        let mut classifications: Vec<BookmarkClassification> =
            self.shared.state().entries.values().cloned().collect();
        classifications.sort_by(|a, b| a.url.cmp(&b.url));
        CacheSnapshot {
            version: CACHE_SCHEMA_VERSION,
            classifications,
            domain_stats: self.all_domain_stats(),
            stats: Some(self.stats()),
            export_time: Utc::now().to_rfc3339(),
        }
    }

    /// Replaces the whole cache with `snapshot` and persists immediately.
    pub fn import(&self, snapshot: CacheSnapshot) -> Result<usize, StoreError> {
        if snapshot.version != CACHE_SCHEMA_VERSION {
            return Err(StoreError::Serialization(format!(
                "unsupported cache snapshot version {} (expected {})",
                snapshot.version, CACHE_SCHEMA_VERSION
            )));
        }

        let imported = {
            let mut state = self.shared.state();
            state.entries = snapshot
                .classifications
                .into_iter()
                .map(|mut record| {
                    record.url_hash = url_hash(&record.url);
                    record.confidence = record.confidence.clamp(0.0, 1.0);
                    (record.url_hash.clone(), record)
                })
                .collect();
            state.domain_stats = snapshot
                .domain_stats
                .into_iter()
                .map(|s| (s.domain.clone(), s))
                .collect();
            state.entries.len()
        };

        self.flush()?;
        info!(records = imported, "classification cache imported");
        Ok(imported)
    }

    /// Writes the mirror to the store now.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.shared.write_through()
    }

    /// Coalesces writes arriving within [`FLUSH_DELAY`] into one store write.
    /// Outside a tokio runtime the write happens inline.
    fn schedule_flush(&self) {
        if self.shared.flush_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(&self.shared);
                handle.spawn(async move {
                    tokio::time::sleep(FLUSH_DELAY).await;
                    shared.flush_scheduled.store(false, Ordering::Release);
                    if let Err(e) = shared.write_through() {
                        warn!(error = %e, "deferred cache flush failed");
                    }
                });
            }
            Err(_) => {
                self.shared.flush_scheduled.store(false, Ordering::Release);
                if let Err(e) = self.shared.write_through() {
                    warn!(error = %e, "cache flush failed");
                }
            }
        }
    }
}
