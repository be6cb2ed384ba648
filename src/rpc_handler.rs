//! RPC method handler for the SmartMarks JSON-RPC protocol.
//!
//! Requests are parsed into a [`Command`] and executed by [`handle_command`].
//! Engine failures come back as `{"success": false, "error": "..."}` results;
//! only unparseable requests produce an RPC-level error.

use serde_json::{json, Value};
use std::fmt::Display;
use tracing::{debug, warn};

use crate::app::App;
use crate::logging::{self, REDACTED};
use crate::managers::organize_runner::BatchOutcome;
use crate::services::{domain_dictionary, folder_normalizer};
use crate::types::ai::ProviderName;
use crate::types::classification::{CacheSnapshot, ClassifyOptions};
use crate::types::errors::{CommandError, SessionError};
use crate::types::settings::{FilterSettings, OrganizerSettings, ProviderSettings};

/// Default number of records returned by `organize.history`.
const DEFAULT_RECENT_RECORDS: usize = 50;

/// Everything the engine can be asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    OrganizeBatch { force_reclassify: bool },
    OrganizeSingleFolder { folder_id: String },
    PreviewOrganize { force_reclassify: bool },
    MoveLink { link_id: String, category: String },
    PauseOrganize,
    ResumeOrganize,
    CancelOrganize,
    GetOrganizeHistory { limit: Option<usize> },
    GetUnprocessed { include_all_folders: bool },
    UndoOrganize { record_id: String },
    ClearProcessed,
    TestProviderConnection { provider: ProviderName, api_key: String, model: String },
    CacheStats { domain: Option<String> },
    CacheExport,
    CacheImport { snapshot: Value },
    CacheLock { url: String },
    CacheUnlock { url: String },
    CacheClear { url: String },
    GetSettings,
    SetSetting { key: String, value: Value },
    SetFilterSettings { settings: Value },
    SetProviderSettings { settings: Value },
    SetOrganizerSettings { settings: Value },
    LinkCreated { link_id: String },
    LinkMoved { link_id: String, parent_id: String },
    MergeSuggestions,
    StandardFolders,
    SuggestFolder { name: String },
}

fn str_param<'a>(params: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| params.get(*k).and_then(|v| v.as_str()))
}

fn link_id(params: &Value) -> Result<String, CommandError> {
    Ok(str_param(params, &["link_id", "linkId", "bookmarkId", "bookmark_id"])
        .ok_or("missing link_id")?
        .to_string())
}

fn bool_param(params: &Value, keys: &[&str]) -> bool {
    keys.iter()
        .find_map(|k| params.get(*k).and_then(|v| v.as_bool()))
        .unwrap_or(false)
}

fn force_reclassify(params: &Value) -> bool {
    bool_param(params, &["force_reclassify", "forceReclassify"])
}

fn object_param(params: &Value, key: &str) -> Value {
    match params.get(key) {
        Some(v) if v.is_object() => v.clone(),
        _ => params.clone(),
    }
}

/// Builds a [`Command`] from a JSON-RPC method name and its params.
pub fn parse_command(method: &str, params: &Value) -> Result<Command, CommandError> {
    let command = match method {
        "ping" => Command::Ping,

        // ─── Organize ───
        "organize.batch" => Command::OrganizeBatch {
            force_reclassify: force_reclassify(params),
        },
        "organize.folder" => Command::OrganizeSingleFolder {
            folder_id: str_param(params, &["folder_id", "folderId"])
                .ok_or("missing folder_id")?
                .to_string(),
        },
        "organize.preview" => Command::PreviewOrganize {
            force_reclassify: force_reclassify(params),
        },
        "organize.move" => Command::MoveLink {
            link_id: link_id(params)?,
            category: params
                .get("category")
                .and_then(|v| v.as_str())
                .ok_or("missing category")?
                .to_string(),
        },
        "organize.pause" => Command::PauseOrganize,
        "organize.resume" => Command::ResumeOrganize,
        "organize.cancel" => Command::CancelOrganize,
        "organize.history" => Command::GetOrganizeHistory {
            limit: params.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize),
        },
        "organize.unprocessed" => Command::GetUnprocessed {
            include_all_folders: bool_param(params, &["include_all_folders", "includeAllFolders"]),
        },
        "organize.undo" => Command::UndoOrganize {
            record_id: str_param(params, &["record_id", "recordId"])
                .ok_or("missing record_id")?
                .to_string(),
        },
        "processed.clear" => Command::ClearProcessed,

        // ─── Provider ───
        "provider.test" => {
            let name = params.get("provider").and_then(|v| v.as_str()).ok_or("missing provider")?;
            let provider = ProviderName::parse(name)
                .ok_or_else(|| CommandError::InvalidParams(format!("unsupported provider: {}", name)))?;
            Command::TestProviderConnection {
                provider,
                api_key: str_param(params, &["api_key", "apiKey"])
                    .ok_or("missing api_key")?
                    .to_string(),
                model: params.get("model").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            }
        }

        // ─── Cache ───
        "cache.stats" => Command::CacheStats {
            domain: params.get("domain").and_then(|v| v.as_str()).map(str::to_string),
        },
        "cache.export" => Command::CacheExport,
        "cache.import" => Command::CacheImport {
            snapshot: params.get("snapshot").cloned().ok_or("missing snapshot")?,
        },
        "cache.lock" | "cache.unlock" | "cache.clear" => {
            let url = params.get("url").and_then(|v| v.as_str()).ok_or("missing url")?.to_string();
            match method {
                "cache.lock" => Command::CacheLock { url },
                "cache.unlock" => Command::CacheUnlock { url },
                _ => Command::CacheClear { url },
            }
        }

        // ─── Settings ───
        "settings.get" => Command::GetSettings,
        "settings.set" => Command::SetSetting {
            key: params.get("key").and_then(|v| v.as_str()).ok_or("missing key")?.to_string(),
            value: params.get("value").cloned().ok_or("missing value")?,
        },
        "settings.set_filter" => Command::SetFilterSettings {
            settings: object_param(params, "settings"),
        },
        "settings.set_provider" => Command::SetProviderSettings {
            settings: object_param(params, "settings"),
        },
        "settings.set_organizer" => Command::SetOrganizerSettings {
            settings: object_param(params, "settings"),
        },

        // ─── Tree events ───
        "bookmark.created" => Command::LinkCreated {
            link_id: link_id(params)?,
        },
        "bookmark.moved" => Command::LinkMoved {
            link_id: link_id(params)?,
            parent_id: str_param(params, &["parent_id", "parentId"])
                .ok_or("missing parent_id")?
                .to_string(),
        },
        "folders.merge_suggestions" => Command::MergeSuggestions,
        "folders.standard" => Command::StandardFolders,
        "folders.suggest" => Command::SuggestFolder {
            name: params.get("name").and_then(|v| v.as_str()).ok_or("missing name")?.to_string(),
        },

        other => return Err(CommandError::UnknownMethod(other.to_string())),
    };
    Ok(command)
}

impl Command {
    /// Parses a `{"type": "ORGANIZE_BATCH", ...}` style message.
    pub fn from_message(message: &Value) -> Result<Self, CommandError> {
        let kind = message.get("type").and_then(|v| v.as_str()).ok_or("missing type")?;
        let method = match kind {
            "ORGANIZE_BATCH" => "organize.batch",
            "ORGANIZE_SINGLE_FOLDER" => "organize.folder",
            "PREVIEW_ORGANIZE" => "organize.preview",
            "MOVE_LINK" | "MOVE_BOOKMARK" => "organize.move",
            "PAUSE_ORGANIZE" => "organize.pause",
            "RESUME_ORGANIZE" => "organize.resume",
            "CANCEL_ORGANIZE" => "organize.cancel",
            "GET_ORGANIZE_HISTORY" => "organize.history",
            "GET_UNPROCESSED" | "GET_UNPROCESSED_BOOKMARKS" => "organize.unprocessed",
            "UNDO_ORGANIZE" => "organize.undo",
            "CLEAR_PROCESSED" | "CLEAR_PROCESSED_BOOKMARKS" => "processed.clear",
            "TEST_PROVIDER_CONNECTION" | "TEST_AI_CONNECTION" => "provider.test",
            other => return Err(CommandError::UnknownMethod(other.to_string())),
        };
        parse_command(method, message)
    }
}

fn failure(error: impl Display) -> Value {
    json!({"success": false, "error": error.to_string()})
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|e| CommandError::Internal(e.to_string()))
}

fn parse_settings<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, CommandError> {
    serde_json::from_value(value).map_err(|e| CommandError::InvalidParams(e.to_string()))
}

fn batch_response(result: Result<BatchOutcome, SessionError>) -> Value {
    match result {
        Ok(BatchOutcome::Completed { processed, requested }) => {
            json!({"success": true, "processed": processed, "requested": requested})
        }
        Ok(BatchOutcome::Paused { processed, remaining }) => {
            json!({"success": true, "paused": true, "processed": processed, "remaining": remaining})
        }
        Ok(BatchOutcome::Cancelled { processed, requested }) => {
            json!({"success": true, "cancelled": true, "processed": processed, "requested": requested})
        }
        Ok(BatchOutcome::NothingToDo) => json!({"success": true, "processed": 0, "requested": 0}),
        Err(e) => failure(e),
    }
}

/// The redacted snapshot shows a masked key list as a single string.
fn unmask_key_list(mut settings: Value) -> Value {
    if settings.get("linkPreviewKeys").and_then(|v| v.as_str()) == Some(REDACTED) {
        settings["linkPreviewKeys"] = json!([REDACTED]);
    }
    settings
}

/// Keeps stored secrets when the client echoes back the masked placeholder.
fn merge_masked_secrets(mut incoming: ProviderSettings, current: &ProviderSettings) -> ProviderSettings {
    if incoming.api_key == REDACTED {
        incoming.api_key = current.api_key.clone();
    }
    if incoming.link_preview_keys.iter().any(|k| k == REDACTED) {
        incoming.link_preview_keys = current.link_preview_keys.clone();
    }
    incoming
}

/// Executes one command against the engine.
pub async fn handle_command(app: &App, command: Command) -> Result<Value, CommandError> {
    let response = match command {
        Command::Ping => json!({"pong": true, "version": env!("CARGO_PKG_VERSION")}),

        // ─── Organize ───
        Command::OrganizeBatch { force_reclassify } => {
            let options = ClassifyOptions { force_reclassify };
            batch_response(app.runner.organize_batch_with(options).await)
        }
        Command::ResumeOrganize => {
            if !app.sessions.is_paused() {
                return Ok(failure(SessionError::NoActiveSession));
            }
            batch_response(app.runner.organize_batch().await)
        }
        Command::OrganizeSingleFolder { folder_id } => {
            batch_response(app.runner.organize_folder(&folder_id).await)
        }
        Command::PreviewOrganize { force_reclassify } => match app
            .runner
            .preview_with(ClassifyOptions { force_reclassify })
            .await
        {
            Ok(items) => json!({"success": true, "results": to_value(&items)?}),
            Err(e) => failure(e),
        },
        Command::MoveLink { link_id, category } => match app.runner.move_link(&link_id, &category).await {
            Ok(outcome) if outcome.moved => json!({"success": true, "folderId": outcome.folder_id}),
            Ok(outcome) => failure(outcome.skipped_reason.unwrap_or_else(|| "not moved".to_string())),
            Err(e) => failure(e),
        },
        Command::PauseOrganize => json!({"success": app.runner.request_pause()}),
        Command::CancelOrganize => match app.runner.request_cancel() {
            Ok(cancelled) => json!({"success": cancelled}),
            Err(e) => failure(e),
        },
        Command::GetOrganizeHistory { limit } => json!({
            "currentSession": to_value(&app.sessions.current_session())?,
            "recentRecords": to_value(&app.sessions.recent_records(limit.unwrap_or(DEFAULT_RECENT_RECORDS)))?,
            "history": to_value(&app.sessions.history(limit))?,
        }),
        Command::GetUnprocessed { include_all_folders } => match app.runner.unprocessed(include_all_folders).await {
            Ok(links) => json!({"success": true, "links": to_value(&links)?}),
            Err(e) => failure(e),
        },
        Command::UndoOrganize { record_id } => match app.sessions.undo(&record_id).await {
            Ok(record) => json!({"success": true, "record": to_value(&record)?}),
            Err(e) => failure(e),
        },
        Command::ClearProcessed => match app.coordinator.clear_processed() {
            Ok(()) => json!({"success": true}),
            Err(e) => failure(e),
        },

        // ─── Provider ───
        Command::TestProviderConnection { provider, api_key, model } => {
            match app.resolver.test_connection(provider, &api_key, &model).await {
                Ok(()) => json!({"success": true}),
                Err(e) => failure(logging::redact(&e.to_string())),
            }
        }

        // ─── Cache ───
        Command::CacheStats { domain: None } => json!({
            "stats": to_value(&app.cache.stats())?,
            "domains": to_value(&app.cache.all_domain_stats())?,
        }),
        Command::CacheStats { domain: Some(domain) } => json!({
            "domain": to_value(&app.cache.domain_stats(&domain))?,
        }),
        Command::CacheExport => to_value(&app.cache.export())?,
        Command::CacheImport { snapshot } => {
            let snapshot: CacheSnapshot = parse_settings(snapshot)?;
            match app.cache.import(snapshot) {
                Ok(imported) => json!({"success": true, "imported": imported}),
                Err(e) => failure(e),
            }
        }
        Command::CacheLock { url } => json!({"success": app.cache.lock(&url)}),
        Command::CacheUnlock { url } => json!({"success": app.cache.unlock(&url)}),
        Command::CacheClear { url } => json!({"success": app.cache.clear_url(&url)}),

        // ─── Settings ───
        Command::GetSettings => app.settings.redacted_snapshot(),
        Command::SetSetting { key, value } => match app.settings.set_value(&key, value) {
            Ok(()) => json!({"success": true}),
            Err(e) => failure(e),
        },
        Command::SetFilterSettings { settings } => {
            match app.settings.set_filter(parse_settings::<FilterSettings>(settings)?) {
                Ok(()) => json!({"success": true}),
                Err(e) => failure(e),
            }
        }
        Command::SetProviderSettings { settings } => {
            let incoming = parse_settings::<ProviderSettings>(unmask_key_list(settings))?;
            let merged = merge_masked_secrets(incoming, &app.settings.provider());
            match app.settings.set_provider(merged) {
                Ok(()) => json!({"success": true}),
                Err(e) => failure(e),
            }
        }
        Command::SetOrganizerSettings { settings } => {
            match app.settings.set_organizer(parse_settings::<OrganizerSettings>(settings)?) {
                Ok(()) => json!({"success": true}),
                Err(e) => failure(e),
            }
        }

        // ─── Tree events ───
        Command::LinkCreated { link_id } => match app.runner.organize_single(&link_id).await {
            Ok(Some(done)) => {
                let moved = done.outcome.as_ref().is_some_and(|o| o.moved);
                json!({
                    "success": true,
                    "organized": moved,
                    "category": done.classification.category,
                    "confidence": done.classification.confidence,
                    "folderId": done.outcome.and_then(|o| o.folder_id),
                })
            }
            Ok(None) => json!({"success": true, "organized": false}),
            Err(e) => {
                warn!(link_id = %link_id, error = %e, "auto-organize failed");
                failure(e)
            }
        },
        Command::LinkMoved { link_id, parent_id } => {
            match app.coordinator.on_external_move(&link_id, &parent_id).await {
                Ok(interference) => json!({"success": true, "interference": interference}),
                Err(e) => failure(e),
            }
        }
        Command::MergeSuggestions => match app.tree.all_folders().await {
            Ok(folders) => {
                let names: Vec<String> = folders
                    .into_iter()
                    .filter(|f| !f.is_root_container())
                    .map(|f| f.title)
                    .collect();
                json!({"success": true, "suggestions": folder_normalizer::merge_suggestions(&names)})
            }
            Err(e) => failure(e),
        },
        Command::StandardFolders => {
            let folders: Vec<Value> = folder_normalizer::STANDARD_FOLDERS
                .iter()
                .map(|name| json!({"name": name, "variants": folder_normalizer::folder_variants(name)}))
                .collect();
            json!({
                "folders": folders,
                "dictionaryCategories": domain_dictionary::all_categories(),
            })
        }
        Command::SuggestFolder { name } => json!({
            "name": name,
            "needsNormalization": folder_normalizer::needs_normalization(&name),
            "normalized": folder_normalizer::normalize(&name),
            "standard": folder_normalizer::find_similar_standard_folder(&name),
        }),
    };
    Ok(response)
}

/// Dispatch a JSON-RPC method call to the appropriate handler.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method(app: &App, method: &str, params: &Value) -> Result<Value, String> {
    debug!(method, "rpc request");
    let command = parse_command(method, params).map_err(|e| e.to_string())?;
    handle_command(app, command).await.map_err(|e| e.to_string())
}
