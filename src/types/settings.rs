use serde::{Deserialize, Serialize};

use super::ai::ProviderName;

/// Folder exclusion rules applied before organizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSettings {
    pub exclude_folders: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub auto_filter: bool,
    pub ignore_case: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            exclude_folders: Vec::new(),
            exclude_patterns: Vec::new(),
            auto_filter: true,
            ignore_case: true,
        }
    }
}

/// AI and metadata provider configuration, with secrets in plaintext.
///
/// Only [`SealedProviderSettings`] is ever written to the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    pub provider: ProviderName,
    pub api_key: String,
    pub model: String,
    pub link_preview_keys: Vec<String>,
    pub scrape_endpoint: Option<String>,
}

impl ProviderSettings {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// At-rest form of [`ProviderSettings`]: every key is AES-GCM sealed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SealedProviderSettings {
    pub provider: ProviderName,
    pub sealed_api_key: Option<String>,
    pub model: String,
    pub sealed_link_preview_keys: Vec<String>,
    pub scrape_endpoint: Option<String>,
}

/// Tunables for the organize pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizerSettings {
    pub confidence_threshold: f64,
    pub staging_folder_name: String,
    pub auto_classify: bool,
    pub expected_location_ttl_secs: u64,
    pub revert_interference: bool,
    pub history_retention_days: u32,
    pub history_max_sessions: usize,
    pub batch_delay_ms: u64,
}

impl Default for OrganizerSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            staging_folder_name: "智能分类".to_string(),
            auto_classify: true,
            expected_location_ttl_secs: 30,
            revert_interference: false,
            history_retention_days: 30,
            history_max_sessions: 100,
            batch_delay_ms: 100,
        }
    }
}
