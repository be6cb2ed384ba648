//! Durable key-value store for engine state.
//!
//! Every piece of state the engine owns (classification cache, processed set,
//! sessions, settings) is a JSON document under a well-known key.

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::database::Database;
use crate::types::errors::StoreError;

pub const KEY_CLASSIFICATIONS: &str = "bookmarkClassifications_v2";
pub const KEY_DOMAIN_STATS: &str = "domainStats_v2";
pub const KEY_PROCESSED: &str = "processedBookmarks";
pub const KEY_CURRENT_SESSION: &str = "currentOrganizeSession";
pub const KEY_HISTORY: &str = "organizeHistory";
pub const KEY_FILTER_SETTINGS: &str = "filterSettings";
pub const KEY_PROVIDER_SETTINGS: &str = "providerSettings";
pub const KEY_ORGANIZER_SETTINGS: &str = "organizerSettings";
pub const KEY_PREVIEW_QUOTA: &str = "linkPreviewQuota";

/// Raw string-valued storage.
pub trait StateStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed JSON access on top of any [`StateStore`].
pub trait StateStoreExt: StateStore {
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw)
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

/// State store backed by the `kv_store` SQLite table.
pub struct SqliteStateStore {
    db: Arc<Database>,
}

impl SqliteStateStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl StateStore for SqliteStateStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.db.connection()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.db.connection()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// Volatile store, used by tests and by callers that opt out of persistence.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryStateStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }
}
