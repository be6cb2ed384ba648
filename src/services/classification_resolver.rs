//! Multi-stage classification: user override, domain dictionary, cache,
//! metadata enrichment and finally the AI provider.
//!
//! [`ClassificationResolver::classify`] never fails. Every stage error degrades
//! to [`ClassificationResult::fallback`], which is not cached.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::managers::bookmark_tree::BookmarkTree;
use crate::services::ai_provider::{self, ProviderFactory};
use crate::services::classification_cache::ClassificationCache;
use crate::services::domain_dictionary;
use crate::services::folder_normalizer;
use crate::services::metadata_enrichment::MetadataEnricher;
use crate::services::settings_engine::SettingsEngine;
use crate::types::ai::{ClassificationRequest, ProviderName};
use crate::types::bookmark::Link;
use crate::types::classification::{
    BookmarkClassification, ClassificationResult, ClassificationSource, ClassifyOptions,
};
use crate::types::errors::{ProviderError, TreeError};
use crate::types::settings::ProviderSettings;

/// Browser-managed folder titles that are never offered as categories.
pub const SYSTEM_FOLDER_TITLES: &[&str] = &["书签栏", "其他书签", "移动设备书签"];

fn from_record(record: BookmarkClassification, reasoning: &str) -> ClassificationResult {
    ClassificationResult {
        category: record.category,
        confidence: record.confidence,
        reasoning: Some(reasoning.to_string()),
        suggested_title: None,
        source: record.source,
    }
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

pub struct ClassificationResolver {
    cache: Arc<ClassificationCache>,
    enricher: Arc<MetadataEnricher>,
    providers: Arc<dyn ProviderFactory>,
    tree: Arc<dyn BookmarkTree>,
    settings: Arc<SettingsEngine>,
}

impl ClassificationResolver {
    pub fn new(
        cache: Arc<ClassificationCache>,
        enricher: Arc<MetadataEnricher>,
        providers: Arc<dyn ProviderFactory>,
        tree: Arc<dyn BookmarkTree>,
        settings: Arc<SettingsEngine>,
    ) -> Self {
        Self {
            cache,
            enricher,
            providers,
            tree,
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    /// Resolves the category for `link`.
    pub async fn classify(
        &self,
        link: &Link,
        provider_settings: &ProviderSettings,
        options: ClassifyOptions,
    ) -> ClassificationResult {
        let url = link.url.as_str();

        if options.force_reclassify {
            self.cache.clear_for_domain(url);
        } else if let Some(record) = self.cache.peek(url) {
            if record.source == ClassificationSource::Manual {
                debug!(url, category = %record.category, "user override");
                return from_record(record, "user confirmed");
            }
        }

        if let Some(hit) = domain_dictionary::lookup(url) {
            let category = folder_normalizer::normalize(hit.category);
            if !self
                .cache
                .set(url, &category, hit.confidence, ClassificationSource::Dictionary, Some(true))
            {
                if let Some(locked) = self.cache.peek(url) {
                    return from_record(locked, "locked classification");
                }
            }
            debug!(url, domain = %hit.domain, category = %category, "dictionary hit");
            return ClassificationResult {
                category,
                confidence: hit.confidence,
                reasoning: Some(format!("known domain {}", hit.domain)),
                suggested_title: None,
                source: ClassificationSource::Dictionary,
            };
        }

        if !options.force_reclassify {
            if let Some(record) = self.cache.get(url) {
                return from_record(record, "cached classification");
            }
        }

        self.classify_with_provider(link, provider_settings).await
    }

    async fn classify_with_provider(
        &self,
        link: &Link,
        provider_settings: &ProviderSettings,
    ) -> ClassificationResult {
        let url = link.url.as_str();

        let provider = match self.providers.create(provider_settings) {
            Ok(p) => p,
            Err(e) => {
                warn!(url, error = %e, "no usable AI provider");
                return ClassificationResult::fallback(e.to_string());
            }
        };

        let mut request = ClassificationRequest {
            title: link.title.clone(),
            url: link.url.clone(),
            description: non_empty(link.description.as_deref()),
            keywords: link.keywords.clone(),
            existing_folders: Vec::new(),
        };

        let mut enriched = false;
        if request.description.is_none() {
            if let Some(meta) = self.enricher.enrich(url, provider_settings).await {
                enriched = meta.has_description();
                request.description = non_empty(meta.description.as_deref());
                if request.title.trim().is_empty() {
                    if let Some(title) = non_empty(meta.title.as_deref()) {
                        request.title = title;
                    }
                }
                for keyword in meta.keywords {
                    if !request.keywords.contains(&keyword) {
                        request.keywords.push(keyword);
                    }
                }
            }
        }

        request.existing_folders = match self.existing_folders().await {
            Ok(folders) => folders,
            Err(e) => {
                warn!(error = %e, "could not read folder vocabulary");
                Vec::new()
            }
        };

        let reply = match ai_provider::classify_with(provider.as_ref(), &request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(url, provider = %provider.name(), error = %e, "AI classification failed");
                return ClassificationResult::fallback(e.to_string());
            }
        };

        let category = folder_normalizer::normalize(&reply.category);
        if category.is_empty() {
            return ClassificationResult::fallback("empty category");
        }

        let source = if enriched {
            ClassificationSource::Enrichment
        } else {
            ClassificationSource::Ai
        };
        if !self.cache.set(url, &category, reply.confidence, source, None) {
            if let Some(locked) = self.cache.peek(url) {
                return from_record(locked, "locked classification");
            }
        }
        info!(url, category = %category, confidence = reply.confidence, source = source.as_str(), "link classified");

        ClassificationResult {
            category,
            confidence: reply.confidence,
            reasoning: reply.reasoning,
            suggested_title: reply.suggested_title,
            source,
        }
    }

    /// Normalized titles of the user's folders, without root containers,
    /// browser system folders or the staging container.
    pub async fn existing_folders(&self) -> Result<Vec<String>, TreeError> {
        let staging = self.settings.organizer().staging_folder_name;
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for folder in self.tree.all_folders().await? {
            let title = folder.title.trim();
            if folder.is_root_container()
                || title.is_empty()
                || title == staging
                || SYSTEM_FOLDER_TITLES.contains(&title)
            {
                continue;
            }
            let name = folder_normalizer::normalize(title);
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Sends one throwaway request to check credentials and reachability.
    pub async fn test_connection(
        &self,
        provider: ProviderName,
        api_key: &str,
        model: &str,
    ) -> Result<(), ProviderError> {
        let settings = ProviderSettings {
            provider,
            api_key: api_key.to_string(),
            model: model.to_string(),
            ..ProviderSettings::default()
        };
        let backend = self.providers.create(&settings)?;
        let sample = ClassificationRequest {
            title: "Example Domain".to_string(),
            url: "https://example.com".to_string(),
            description: None,
            keywords: Vec::new(),
            existing_folders: Vec::new(),
        };
        backend.complete(&sample).await?;
        info!(provider = %provider, "provider connection ok");
        Ok(())
    }
}
