//! Unit tests for the SettingsEngine.
//!
//! Sections are stored through a `MemoryStateStore`; provider keys must be
//! sealed at rest and masked in the display snapshot.

use serde_json::json;
use std::sync::Arc;

use smartmarks::logging::REDACTED;
use smartmarks::services::crypto_service::CryptoService;
use smartmarks::services::settings_engine::SettingsEngine;
use smartmarks::services::state_store::{
    MemoryStateStore, StateStore, KEY_ORGANIZER_SETTINGS, KEY_PROVIDER_SETTINGS,
};
use smartmarks::types::ai::ProviderName;
use smartmarks::types::errors::SettingsError;
use smartmarks::types::settings::{FilterSettings, OrganizerSettings, ProviderSettings};

const API_KEY: &str = "sk-test1234567890abcdefghijklmnop";

fn crypto() -> CryptoService {
    CryptoService::with_passphrase("settings-test", b"settings-salt").expect("crypto")
}

/// Helper: a fresh engine and the store behind it.
fn setup() -> (SettingsEngine, Arc<MemoryStateStore>) {
    let store = Arc::new(MemoryStateStore::new());
    let engine = SettingsEngine::new(store.clone(), crypto());
    (engine, store)
}

#[test]
fn test_defaults_when_store_is_empty() {
    let (engine, _) = setup();
    assert_eq!(engine.filter(), FilterSettings::default());
    assert_eq!(engine.organizer(), OrganizerSettings::default());
    assert_eq!(engine.organizer().confidence_threshold, 0.7);
    assert_eq!(engine.organizer().staging_folder_name, "智能分类");
    assert!(!engine.provider().has_api_key());
}

#[test]
fn test_set_value_by_dot_path() {
    let (engine, store) = setup();
    engine
        .set_value("organizer.confidenceThreshold", json!(0.85))
        .unwrap();
    assert_eq!(engine.organizer().confidence_threshold, 0.85);

    let raw = store.get_raw(KEY_ORGANIZER_SETTINGS).unwrap().expect("saved");
    assert!(raw.contains("\"confidenceThreshold\":0.85"));

    engine
        .set_value("filter.excludeFolders", json!(["私人", "Work"]))
        .unwrap();
    assert_eq!(engine.filter().exclude_folders, vec!["私人", "Work"]);
}

#[test]
fn test_set_value_rejects_unknown_keys() {
    let (engine, _) = setup();
    assert!(matches!(
        engine.set_value("organizer.nope", json!(1)),
        Err(SettingsError::InvalidKey(_))
    ));
    assert!(matches!(
        engine.set_value("theme.mode", json!("dark")),
        Err(SettingsError::InvalidKey(_))
    ));
    assert!(matches!(
        engine.set_value("organizer", json!(1)),
        Err(SettingsError::InvalidKey(_))
    ));
}

#[test]
fn test_set_value_rejects_wrong_types() {
    let (engine, _) = setup();
    let err = engine
        .set_value("organizer.autoClassify", json!("yes"))
        .unwrap_err();
    assert!(matches!(err, SettingsError::InvalidValue(_)));
    assert!(engine.organizer().auto_classify);
}

#[test]
fn test_threshold_out_of_range_rejected() {
    let (engine, _) = setup();
    let err = engine
        .set_value("organizer.confidenceThreshold", json!(1.5))
        .unwrap_err();
    assert!(matches!(err, SettingsError::InvalidValue(_)));
    assert_eq!(engine.organizer().confidence_threshold, 0.7);
}

/// API keys never reach the store in plaintext and survive a reload.
#[test]
fn test_provider_keys_sealed_at_rest() {
    let (engine, store) = setup();
    engine
        .set_provider(ProviderSettings {
            provider: ProviderName::DeepSeek,
            api_key: API_KEY.to_string(),
            model: "deepseek-chat".to_string(),
            link_preview_keys: vec!["preview-key-one".to_string()],
            scrape_endpoint: None,
        })
        .unwrap();

    let raw = store.get_raw(KEY_PROVIDER_SETTINGS).unwrap().expect("saved");
    assert!(!raw.contains(API_KEY));
    assert!(!raw.contains("preview-key-one"));
    assert!(raw.contains("deepseek"));

    let reloaded = SettingsEngine::new(store.clone(), crypto());
    let provider = reloaded.provider();
    assert_eq!(provider.provider, ProviderName::DeepSeek);
    assert_eq!(provider.api_key, API_KEY);
    assert_eq!(provider.link_preview_keys, vec!["preview-key-one"]);
}

/// A different vault cannot open the keys; they are dropped, not fatal.
#[test]
fn test_unopenable_keys_are_dropped_on_load() {
    let (engine, store) = setup();
    engine
        .set_provider(ProviderSettings {
            api_key: API_KEY.to_string(),
            ..ProviderSettings::default()
        })
        .unwrap();

    let other = CryptoService::with_passphrase("other", b"other-salt").unwrap();
    let reloaded = SettingsEngine::new(store, other);
    assert!(!reloaded.provider().has_api_key());
}

#[test]
fn test_redacted_snapshot_masks_api_key() {
    let (engine, _) = setup();
    engine
        .set_provider(ProviderSettings {
            api_key: API_KEY.to_string(),
            model: "gpt-4o-mini".to_string(),
            ..ProviderSettings::default()
        })
        .unwrap();

    let snapshot = engine.redacted_snapshot();
    assert_eq!(snapshot["provider"]["apiKey"], json!(REDACTED));
    assert_eq!(snapshot["provider"]["model"], json!("gpt-4o-mini"));
    assert!(!snapshot.to_string().contains(API_KEY));
    assert_eq!(snapshot["organizer"]["confidenceThreshold"], json!(0.7));
}

#[test]
fn test_reset_restores_defaults() {
    let (engine, store) = setup();
    engine.set_value("organizer.batchDelayMs", json!(0)).unwrap();
    engine.set_value("filter.autoFilter", json!(false)).unwrap();

    engine.reset().unwrap();
    assert_eq!(engine.organizer(), OrganizerSettings::default());
    assert_eq!(engine.filter(), FilterSettings::default());

    let reloaded = SettingsEngine::new(store, crypto());
    assert_eq!(reloaded.organizer().batch_delay_ms, 100);
}

/// An unreadable document falls back to defaults instead of failing.
#[test]
fn test_corrupt_section_uses_defaults() {
    let store = Arc::new(MemoryStateStore::new());
    store.set_raw(KEY_ORGANIZER_SETTINGS, "{not json").unwrap();
    let engine = SettingsEngine::new(store, crypto());
    assert_eq!(engine.organizer(), OrganizerSettings::default());
}
