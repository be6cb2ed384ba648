// SmartMarks Settings Engine
// Manages filter, provider and organizer settings: loading, saving, updating
// individual values and resetting to defaults. Documents live in the state store;
// provider keys are sealed with the CryptoService before they are written.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::logging;
use crate::services::crypto_service::CryptoService;
use crate::services::state_store::{
    StateStore, StateStoreExt, KEY_FILTER_SETTINGS, KEY_ORGANIZER_SETTINGS, KEY_PROVIDER_SETTINGS,
};
use crate::types::errors::SettingsError;
use crate::types::settings::{
    FilterSettings, OrganizerSettings, ProviderSettings, SealedProviderSettings,
};

#[derive(Debug, Clone, Default)]
struct SettingsState {
    filter: FilterSettings,
    provider: ProviderSettings,
    organizer: OrganizerSettings,
}

/// Settings engine persisting each section as a JSON document.
pub struct SettingsEngine {
    store: Arc<dyn StateStore>,
    crypto: CryptoService,
    state: RwLock<SettingsState>,
}

impl SettingsEngine {
    /// Creates the engine and loads every section, falling back to defaults
    /// for sections that are absent or unreadable.
    pub fn new(store: Arc<dyn StateStore>, crypto: CryptoService) -> Self {
        let engine = Self {
            store,
            crypto,
            state: RwLock::new(SettingsState::default()),
        };
        engine.load();
        engine
    }

    /// Reloads all sections from the store.
    pub fn load(&self) {
        let filter = self.load_section::<FilterSettings>(KEY_FILTER_SETTINGS);
        let organizer = self.load_section::<OrganizerSettings>(KEY_ORGANIZER_SETTINGS);
        let sealed = self.load_section::<SealedProviderSettings>(KEY_PROVIDER_SETTINGS);
        let provider = self.unseal(sealed);

        let mut state = self.write_state();
        state.filter = filter;
        state.organizer = organizer;
        state.provider = provider;
    }

    fn load_section<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.store.load::<T>(key) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                warn!(key, error = %e, "unreadable settings document, using defaults");
                T::default()
            }
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SettingsState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SettingsState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn filter(&self) -> FilterSettings {
        self.read_state().filter.clone()
    }

    pub fn provider(&self) -> ProviderSettings {
        self.read_state().provider.clone()
    }

    pub fn organizer(&self) -> OrganizerSettings {
        self.read_state().organizer.clone()
    }

    pub fn set_filter(&self, settings: FilterSettings) -> Result<(), SettingsError> {
        self.store.save(KEY_FILTER_SETTINGS, &settings)?;
        self.write_state().filter = settings;
        Ok(())
    }

    pub fn set_organizer(&self, settings: OrganizerSettings) -> Result<(), SettingsError> {
        validate_organizer(&settings)?;
        self.store.save(KEY_ORGANIZER_SETTINGS, &settings)?;
        self.write_state().organizer = settings;
        Ok(())
    }

    pub fn set_provider(&self, settings: ProviderSettings) -> Result<(), SettingsError> {
        let sealed = self.seal(&settings)?;
        self.store.save(KEY_PROVIDER_SETTINGS, &sealed)?;
        debug!(
            provider = %settings.provider,
            model = %settings.model,
            api_key = %logging::redact(&settings.api_key),
            preview_keys = settings.link_preview_keys.len(),
            "provider settings saved"
        );
        self.write_state().provider = settings;
        Ok(())
    }

    /// Updates an individual setting by dot-notation key path.
    ///
    /// The first segment names the section (`filter`, `provider`, `organizer`),
    /// the rest navigates inside it using the camelCase field names.
    ///
    /// # Examples
    /// - `"organizer.confidenceThreshold"`
    /// - `"filter.excludeFolders"`
    /// - `"provider.model"`
    pub fn set_value(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let (section, path) = key
            .split_once('.')
            .ok_or_else(|| SettingsError::InvalidKey(format!("Key '{}' has no section", key)))?;
        if path.is_empty() {
            return Err(SettingsError::InvalidKey("Key cannot be empty".to_string()));
        }

        match section {
            "filter" => {
                let updated: FilterSettings = apply_path(&self.filter(), key, path, value)?;
                self.set_filter(updated)
            }
            "organizer" => {
                let updated: OrganizerSettings = apply_path(&self.organizer(), key, path, value)?;
                self.set_organizer(updated)
            }
            "provider" => {
                let updated: ProviderSettings = apply_path(&self.provider(), key, path, value)?;
                self.set_provider(updated)
            }
            other => Err(SettingsError::InvalidKey(format!(
                "Unknown settings section '{}'",
                other
            ))),
        }
    }

    /// Resets every section to factory defaults and saves.
    pub fn reset(&self) -> Result<(), SettingsError> {
        self.set_filter(FilterSettings::default())?;
        self.set_organizer(OrganizerSettings::default())?;
        self.set_provider(ProviderSettings::default())?;
        Ok(())
    }

    /// All sections as JSON with secrets masked, for display.
    pub fn redacted_snapshot(&self) -> Value {
        let state = self.read_state();
        let provider = serde_json::to_value(&state.provider).unwrap_or(Value::Null);
        json!({
            "filter": state.filter,
            "organizer": state.organizer,
            "provider": logging::redact_json(&provider),
        })
    }

    fn seal(&self, settings: &ProviderSettings) -> Result<SealedProviderSettings, SettingsError> {
        let sealed_api_key = if settings.has_api_key() {
            Some(self.crypto.seal(settings.api_key.trim())?)
        } else {
            None
        };
        let sealed_link_preview_keys = settings
            .link_preview_keys
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| self.crypto.seal(k))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SealedProviderSettings {
            provider: settings.provider,
            sealed_api_key,
            model: settings.model.clone(),
            sealed_link_preview_keys,
            scrape_endpoint: settings.scrape_endpoint.clone(),
        })
    }

    /// Opens sealed keys. A key that cannot be opened is dropped with a warning
    /// so a rotated vault never blocks startup.
    fn unseal(&self, sealed: SealedProviderSettings) -> ProviderSettings {
        let api_key = match sealed.sealed_api_key.as_deref() {
            Some(s) => self.crypto.open(s).unwrap_or_else(|e| {
                warn!(error = %e, "stored API key could not be opened");
                String::new()
            }),
            None => String::new(),
        };
        let link_preview_keys = sealed
            .sealed_link_preview_keys
            .iter()
            .filter_map(|s| match self.crypto.open(s) {
                Ok(k) => Some(k),
                Err(e) => {
                    warn!(error = %e, "stored preview key could not be opened");
                    None
                }
            })
            .collect();

        ProviderSettings {
            provider: sealed.provider,
            api_key,
            model: sealed.model,
            link_preview_keys,
            scrape_endpoint: sealed.scrape_endpoint,
        }
    }
}

fn validate_organizer(settings: &OrganizerSettings) -> Result<(), SettingsError> {
    if !(0.0..=1.0).contains(&settings.confidence_threshold) {
        return Err(SettingsError::InvalidValue(format!(
            "confidenceThreshold must be within [0, 1], got {}",
            settings.confidence_threshold
        )));
    }
    if settings.staging_folder_name.trim().is_empty() {
        return Err(SettingsError::InvalidValue(
            "stagingFolderName cannot be empty".to_string(),
        ));
    }
    if settings.history_max_sessions == 0 {
        return Err(SettingsError::InvalidValue(
            "historyMaxSessions must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Serializes `current`, replaces the value at the dot path and deserializes
/// back so serde validates the new value.
fn apply_path<T: Serialize + DeserializeOwned>(
    current: &T,
    key: &str,
    path: &str,
    value: Value,
) -> Result<T, SettingsError> {
    let mut json_value = serde_json::to_value(current)
        .map_err(|e| SettingsError::InvalidValue(format!("Failed to serialize settings: {}", e)))?;

    let parts: Vec<&str> = path.split('.').collect();
    {
        let mut cursor = &mut json_value;
        for (i, part) in parts.iter().enumerate() {
            if i == parts.len() - 1 {
                match cursor {
                    Value::Object(map) => {
                        if !map.contains_key(*part) {
                            return Err(SettingsError::InvalidKey(format!(
                                "Key '{}' not found in settings",
                                key
                            )));
                        }
                        map.insert(part.to_string(), value.clone());
                    }
                    _ => {
                        return Err(SettingsError::InvalidKey(format!(
                            "Cannot navigate to key '{}': intermediate value is not an object",
                            key
                        )));
                    }
                }
            } else {
                cursor = cursor.get_mut(*part).ok_or_else(|| {
                    SettingsError::InvalidKey(format!("Key '{}' not found in settings", key))
                })?;
            }
        }
    }

    serde_json::from_value(json_value)
        .map_err(|e| SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e)))
}
