//! Batch, single-folder, preview and single-link organizing.
//!
//! Drives the resolver, the move coordinator and the session manager. Pause is
//! cooperative: the pause and cancel flags are polled once per link, between
//! links.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::managers::bookmark_tree::BookmarkTree;
use crate::managers::move_coordinator::{FolderStrategy, MoveCoordinator, MoveOutcome};
use crate::managers::session_manager::SessionManager;
use crate::services::classification_resolver::ClassificationResolver;
use crate::services::event_sink::EventSink;
use crate::services::filter_matcher;
use crate::services::folder_normalizer;
use crate::services::settings_engine::SettingsEngine;
use crate::types::bookmark::Link;
use crate::types::classification::{ClassificationResult, ClassificationSource, ClassifyOptions};
use crate::types::errors::{MoveError, SessionError, TreeError};
use crate::types::events::OrganizeEvent;
use crate::types::session::{OrganizeRecord, RecordStatus, SessionStatus};
use crate::types::settings::{OrganizerSettings, ProviderSettings};

/// How a batch run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum BatchOutcome {
    Completed { processed: usize, requested: usize },
    Paused { processed: usize, remaining: usize },
    Cancelled { processed: usize, requested: usize },
    NothingToDo,
}

/// A link with the category it would be filed under.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewItem {
    #[serde(rename = "bookmark")]
    pub link: Link,
    pub suggestion: ClassificationResult,
}

/// Result of handling one newly created link.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleOrganized {
    pub classification: ClassificationResult,
    /// `None` when the classification was not confident enough to move.
    pub outcome: Option<MoveOutcome>,
}

/// Cloneable handle on a stop request (pause or cancel).
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

pub struct OrganizeRunner {
    tree: Arc<dyn BookmarkTree>,
    resolver: Arc<ClassificationResolver>,
    coordinator: Arc<MoveCoordinator>,
    sessions: Arc<SessionManager>,
    settings: Arc<SettingsEngine>,
    events: Arc<dyn EventSink>,
    pause: StopFlag,
    cancel: StopFlag,
}

impl OrganizeRunner {
    pub fn new(
        tree: Arc<dyn BookmarkTree>,
        resolver: Arc<ClassificationResolver>,
        coordinator: Arc<MoveCoordinator>,
        sessions: Arc<SessionManager>,
        settings: Arc<SettingsEngine>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            tree,
            resolver,
            coordinator,
            sessions,
            settings,
            events,
            pause: StopFlag::default(),
            cancel: StopFlag::default(),
        }
    }

    pub fn pause_handle(&self) -> StopFlag {
        self.pause.clone()
    }

    /// Asks the running batch to stop at the next link boundary. Returns
    /// whether a session was running.
    pub fn request_pause(&self) -> bool {
        let running = self.sessions.is_running();
        if running {
            self.pause.request();
            info!("pause requested");
        }
        running
    }

    pub fn cancel_handle(&self) -> StopFlag {
        self.cancel.clone()
    }

    /// Stops the batch for good. A running batch ends as `cancelled` at the
    /// next link boundary; a paused session is closed right away. Returns
    /// whether there was a session to cancel.
    pub fn request_cancel(&self) -> Result<bool, SessionError> {
        if self.sessions.is_running() {
            self.cancel.request();
            info!("cancel requested");
            return Ok(true);
        }
        if self.sessions.is_paused() {
            self.pause.clear();
            let session = self.sessions.end(SessionStatus::Cancelled)?;
            info!(session_id = %session.id, "paused session cancelled");
            return Ok(true);
        }
        Ok(false)
    }

    // ─── Batch ───

    /// Resumes a paused session, or starts one over every unprocessed link
    /// that the filters do not exclude.
    pub async fn organize_batch(&self) -> Result<BatchOutcome, SessionError> {
        self.organize_batch_with(ClassifyOptions::default()).await
    }

    /// [`organize_batch`](Self::organize_batch) with explicit classify options,
    /// e.g. `force_reclassify` to bypass the cache.
    pub async fn organize_batch_with(&self, options: ClassifyOptions) -> Result<BatchOutcome, SessionError> {
        if self.sessions.is_paused() {
            let remaining = self.sessions.resume()?;
            self.pause.clear();
            self.cancel.clear();
            return self.run_queue(remaining, options).await;
        }

        let links = self.filtered_unprocessed().await?;
        if links.is_empty() {
            info!("nothing to organize");
            return Ok(BatchOutcome::NothingToDo);
        }
        self.start_and_run(links.into_iter().map(|l| l.id).collect(), options)
            .await
    }

    /// Organizes the unprocessed links directly inside `folder_id`.
    pub async fn organize_folder(&self, folder_id: &str) -> Result<BatchOutcome, SessionError> {
        if self.tree.get_folder(folder_id).await?.is_none() {
            return Err(TreeError::FolderNotFound(folder_id.to_string()).into());
        }
        let ids: Vec<String> = self
            .tree
            .links_in_folder(folder_id)
            .await?
            .into_iter()
            .filter(|l| !l.url.trim().is_empty() && !self.coordinator.is_processed(&l.id))
            .map(|l| l.id)
            .collect();
        if ids.is_empty() {
            return Ok(BatchOutcome::NothingToDo);
        }
        self.start_and_run(ids, ClassifyOptions::default()).await
    }

    async fn start_and_run(&self, ids: Vec<String>, options: ClassifyOptions) -> Result<BatchOutcome, SessionError> {
        self.sessions.start(ids.len())?;
        self.pause.clear();
        self.cancel.clear();
        self.run_queue(ids, options).await
    }

    async fn run_queue(&self, ids: Vec<String>, options: ClassifyOptions) -> Result<BatchOutcome, SessionError> {
        let provider = self.settings.provider();
        let organizer = self.settings.organizer();
        let delay = Duration::from_millis(organizer.batch_delay_ms);

        for (index, link_id) in ids.iter().enumerate() {
            if self.cancel.take() {
                self.pause.clear();
                let session = self.sessions.end(SessionStatus::Cancelled)?;
                info!(skipped = ids.len() - index, "organize batch cancelled");
                return Ok(BatchOutcome::Cancelled {
                    processed: session.processed_count,
                    requested: session.total_links,
                });
            }
            if self.pause.take() {
                let remaining: Vec<String> = ids[index..].to_vec();
                let remaining_count = remaining.len();
                if let Err(e) = self.sessions.pause(remaining) {
                    return Err(self.fail_session(e));
                }
                let processed = self
                    .sessions
                    .current_session()
                    .map(|s| s.processed_count)
                    .unwrap_or(index);
                return Ok(BatchOutcome::Paused {
                    processed,
                    remaining: remaining_count,
                });
            }

            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let record = self.organize_step(link_id, &provider, &organizer, options).await;
            if let Err(e) = self.sessions.record_step(record) {
                return Err(self.fail_session(e));
            }
        }

        let session = self.sessions.end(SessionStatus::Completed)?;
        Ok(BatchOutcome::Completed {
            processed: session.processed_count,
            requested: session.total_links,
        })
    }

    /// Ends the live session as `error`, keeping its history.
    fn fail_session(&self, cause: SessionError) -> SessionError {
        error!(error = %cause, "organize session failed");
        let session_id = self.sessions.current_session().map(|s| s.id);
        if let Err(e) = self.sessions.end(SessionStatus::Error) {
            warn!(error = %e, "could not close failed session");
        }
        self.events.emit(OrganizeEvent::Error {
            session_id,
            message: cause.to_string(),
        });
        cause
    }

    /// Classifies and files one link. Failures become `error` records.
    async fn organize_step(
        &self,
        link_id: &str,
        provider: &ProviderSettings,
        organizer: &OrganizerSettings,
        options: ClassifyOptions,
    ) -> OrganizeRecord {
        let link = match self.tree.get_link(link_id).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                return OrganizeRecord::new(link_id, "", "", "", RecordStatus::Error)
                    .with_confidence(0.0, Some("bookmark no longer exists".to_string()));
            }
            Err(e) => {
                return OrganizeRecord::new(link_id, "", "", "", RecordStatus::Error)
                    .with_confidence(0.0, Some(e.to_string()));
            }
        };

        let from_title = match link.parent_id.as_deref() {
            Some(parent) => self.tree.get_folder(parent).await.ok().flatten().map(|f| f.title),
            None => None,
        };

        let result = self
            .resolver
            .classify(&link, provider, options)
            .await;
        let record = |status: RecordStatus, reasoning: Option<String>| {
            OrganizeRecord::new(&link.id, &link.title, &link.url, &result.category, status)
                .with_origin(link.parent_id.clone(), from_title.clone())
                .with_confidence(result.confidence, reasoning)
        };

        if result.is_fallback() {
            return record(RecordStatus::Error, result.reasoning.clone());
        }
        if !result.should_auto_move(organizer.confidence_threshold) {
            debug!(link_id, category = %result.category, confidence = result.confidence, "below threshold, left for review");
            return record(RecordStatus::Pending, result.reasoning.clone());
        }

        match self
            .coordinator
            .move_to_category(&link.id, &result.category, FolderStrategy::AlwaysUseStaging)
            .await
        {
            Ok(outcome) if outcome.moved => record(RecordStatus::Completed, result.reasoning.clone()),
            Ok(outcome) => record(RecordStatus::Pending, outcome.skipped_reason),
            Err(e) => {
                warn!(link_id, error = %e, "move failed");
                record(RecordStatus::Error, Some(e.to_string()))
            }
        }
    }

    // ─── Preview / single link / manual ───

    /// Suggestions for every link a batch would touch. Nothing is moved.
    pub async fn preview(&self) -> Result<Vec<PreviewItem>, TreeError> {
        self.preview_with(ClassifyOptions::default()).await
    }

    pub async fn preview_with(&self, options: ClassifyOptions) -> Result<Vec<PreviewItem>, TreeError> {
        let provider = self.settings.provider();
        let mut items = Vec::new();
        for link in self.filtered_unprocessed().await? {
            let suggestion = self.resolver.classify(&link, &provider, options).await;
            items.push(PreviewItem { link, suggestion });
        }
        Ok(items)
    }

    /// Handles a link that was just created. Returns `None` when the link is
    /// skipped (auto-classify off, filtered, already processed or gone).
    pub async fn organize_single(&self, link_id: &str) -> Result<Option<SingleOrganized>, MoveError> {
        let organizer = self.settings.organizer();
        if !organizer.auto_classify {
            return Ok(None);
        }
        let Some(link) = self.tree.get_link(link_id).await? else {
            return Ok(None);
        };
        if link.url.trim().is_empty() || self.coordinator.is_processed(&link.id) {
            return Ok(None);
        }
        if let Some(parent) = link.parent_id.as_deref() {
            let path = self.tree.folder_path(parent).await?;
            if filter_matcher::should_filter(&path, &self.settings.filter()) {
                debug!(link_id, path = %path, "link in excluded folder");
                return Ok(None);
            }
        }

        let classification = self
            .resolver
            .classify(&link, &self.settings.provider(), ClassifyOptions::default())
            .await;
        if !classification.should_auto_move(organizer.confidence_threshold) {
            return Ok(Some(SingleOrganized {
                classification,
                outcome: None,
            }));
        }

        let outcome = self
            .coordinator
            .move_to_category(&link.id, &classification.category, FolderStrategy::Contextual)
            .await?;
        if let (true, Some(folder_id)) = (outcome.moved, outcome.folder_id.as_ref()) {
            self.events.emit(OrganizeEvent::LinkOrganized {
                link_id: link.id.clone(),
                category: classification.category.clone(),
                folder_id: folder_id.clone(),
            });
        }
        Ok(Some(SingleOrganized {
            classification,
            outcome: Some(outcome),
        }))
    }

    /// User-chosen category: moves the link and caches the choice as manual.
    pub async fn move_link(&self, link_id: &str, category: &str) -> Result<MoveOutcome, MoveError> {
        let category = folder_normalizer::normalize(category);
        if category.is_empty() {
            return Err(MoveError::InvalidCategory(category));
        }
        let link = self
            .tree
            .get_link(link_id)
            .await?
            .ok_or_else(|| TreeError::NotFound(link_id.to_string()))?;

        let outcome = self.coordinator.move_manually(&link.id, &category).await?;
        if outcome.moved {
            self.resolver
                .cache()
                .set(&link.url, &category, 1.0, ClassificationSource::Manual, None);
        }
        Ok(outcome)
    }

    // ─── Link selection ───

    /// Links with a URL that are not in the processed set. Links under the
    /// staging container are left out unless `include_all_folders`.
    pub async fn unprocessed(&self, include_all_folders: bool) -> Result<Vec<Link>, TreeError> {
        let staged = if include_all_folders {
            HashSet::new()
        } else {
            self.staging_folder_ids().await?
        };
        let processed = self.coordinator.processed_ids();
        Ok(self
            .tree
            .all_links()
            .await?
            .into_iter()
            .filter(|l| !l.url.trim().is_empty() && !processed.contains(&l.id))
            .filter(|l| l.parent_id.as_ref().map_or(true, |p| !staged.contains(p)))
            .collect())
    }

    async fn filtered_unprocessed(&self) -> Result<Vec<Link>, TreeError> {
        let filter = self.settings.filter();
        let mut paths: HashMap<String, String> = HashMap::new();
        let mut kept = Vec::new();
        for link in self.unprocessed(false).await? {
            if let Some(parent) = link.parent_id.as_deref() {
                if !paths.contains_key(parent) {
                    let path = self.tree.folder_path(parent).await?;
                    paths.insert(parent.to_string(), path);
                }
                let path = paths.get(parent).map(String::as_str).unwrap_or_default();
                if filter_matcher::should_filter(path, &filter) {
                    continue;
                }
            }
            kept.push(link);
        }
        debug!(links = kept.len(), "links selected for organizing");
        Ok(kept)
    }

    /// Staging containers under the root containers and everything below them.
    async fn staging_folder_ids(&self) -> Result<HashSet<String>, TreeError> {
        let staging_name = self.settings.organizer().staging_folder_name;
        let folders = self.tree.all_folders().await?;
        let roots: HashSet<&str> = folders
            .iter()
            .filter(|f| f.is_root_container())
            .map(|f| f.id.as_str())
            .collect();

        let mut ids: HashSet<String> = folders
            .iter()
            .filter(|f| f.title == staging_name && f.parent_id.as_deref().is_some_and(|p| roots.contains(p)))
            .map(|f| f.id.clone())
            .collect();
        loop {
            let before = ids.len();
            for folder in &folders {
                if folder.parent_id.as_ref().is_some_and(|p| ids.contains(p)) {
                    ids.insert(folder.id.clone());
                }
            }
            if ids.len() == before {
                break;
            }
        }
        Ok(ids)
    }
}
