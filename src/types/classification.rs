use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema marker written into every cache record and snapshot.
pub const CACHE_SCHEMA_VERSION: u32 = 2;

/// Category returned when no stage could classify a link.
pub const FALLBACK_CATEGORY: &str = "uncategorized";

/// Confidence attached to the fallback category.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Which resolution stage produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Dictionary,
    Ai,
    Enrichment,
    Manual,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::Dictionary => "dictionary",
            ClassificationSource::Ai => "ai",
            ClassificationSource::Enrichment => "enrichment",
            ClassificationSource::Manual => "manual",
        }
    }
}

/// A persisted, lockable classification keyed by the full URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkClassification {
    pub url: String,
    pub url_hash: String,
    pub category: String,
    pub confidence: f64,
    /// First classification time, epoch millis.
    pub timestamp: i64,
    pub last_used: i64,
    pub source: ClassificationSource,
    pub locked: bool,
    pub version: u32,
}

/// Per-hostname aggregate of how links were categorized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStats {
    pub domain: String,
    pub total_bookmarks: u64,
    pub categories: HashMap<String, u64>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total: usize,
    pub locked: usize,
    pub unlocked: usize,
    pub hits: u64,
    pub misses: u64,
    /// Percentage with two decimals.
    pub hit_rate: f64,
}

/// Versioned export of the whole classification cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub version: u32,
    pub classifications: Vec<BookmarkClassification>,
    pub domain_stats: Vec<DomainStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<CacheStats>,
    #[serde(default)]
    pub export_time: String,
}

/// Outcome of one `classify` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub category: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_title: Option<String>,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    /// The degraded result used when every stage failed.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            category: FALLBACK_CATEGORY.to_string(),
            confidence: FALLBACK_CONFIDENCE,
            reasoning: Some(reason.into()),
            suggested_title: None,
            source: ClassificationSource::Ai,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.category == FALLBACK_CATEGORY
    }

    /// Whether the result is confident enough to relocate the link without asking.
    pub fn should_auto_move(&self, threshold: f64) -> bool {
        !self.is_fallback() && self.confidence >= threshold
    }
}

/// Per-call switches for the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyOptions {
    #[serde(default)]
    pub force_reclassify: bool,
}
