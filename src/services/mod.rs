// SmartMarks services
// Services provide the building blocks of the engine: state storage, settings, classification, enrichment, AI providers.

pub mod ai_provider;
pub mod classification_cache;
pub mod classification_resolver;
pub mod crypto_service;
pub mod domain_dictionary;
pub mod event_sink;
pub mod filter_matcher;
pub mod folder_normalizer;
pub mod http_client;
pub mod metadata_enrichment;
pub mod settings_engine;
pub mod state_store;
