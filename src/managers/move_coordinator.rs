//! Relocates links in the bookmark tree.
//!
//! The tree can be changed by the user at any moment, so the destination and
//! the processed check are re-read right before each write. A link that is
//! already being moved is skipped rather than queued.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::managers::bookmark_tree::BookmarkTree;
use crate::services::event_sink::EventSink;
use crate::services::settings_engine::SettingsEngine;
use crate::services::state_store::{StateStore, StateStoreExt, KEY_PROCESSED};
use crate::types::bookmark::FolderNode;
use crate::types::errors::{MoveError, StoreError, TreeError};
use crate::types::events::OrganizeEvent;

/// Where a category folder that does not exist yet gets created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderStrategy {
    /// Top level, next to the user's own folders. Used for single-link events.
    Contextual,
    /// Inside the staging container. Used for batch runs.
    AlwaysUseStaging,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MoveOutcome {
    pub moved: bool,
    pub folder_id: Option<String>,
    /// Parent the link had before the move.
    pub from_folder: Option<String>,
    pub skipped_reason: Option<String>,
}

impl MoveOutcome {
    fn skipped(reason: &str) -> Self {
        Self {
            skipped_reason: Some(reason.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
struct ExpectedLocation {
    folder_id: String,
    expires_at: Instant,
}

/// Removes the link from the in-flight set when the move finishes or fails.
struct InFlight<'a> {
    moving: &'a Mutex<HashSet<String>>,
    link_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.moving
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.link_id);
    }
}

pub struct MoveCoordinator {
    tree: Arc<dyn BookmarkTree>,
    store: Arc<dyn StateStore>,
    settings: Arc<SettingsEngine>,
    events: Arc<dyn EventSink>,
    moving: Mutex<HashSet<String>>,
    processed: Mutex<HashSet<String>>,
    expected: Mutex<HashMap<String, ExpectedLocation>>,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MoveCoordinator {
    /// Loads the processed set from `store`.
    pub fn new(
        tree: Arc<dyn BookmarkTree>,
        store: Arc<dyn StateStore>,
        settings: Arc<SettingsEngine>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, StoreError> {
        let processed: Vec<String> = store.load(KEY_PROCESSED)?.unwrap_or_default();
        debug!(processed = processed.len(), "processed set loaded");
        Ok(Self {
            tree,
            store,
            settings,
            events,
            moving: Mutex::new(HashSet::new()),
            processed: Mutex::new(processed.into_iter().collect()),
            expected: Mutex::new(HashMap::new()),
        })
    }

    fn begin(&self, link_id: &str) -> Option<InFlight<'_>> {
        if !guard(&self.moving).insert(link_id.to_string()) {
            return None;
        }
        Some(InFlight {
            moving: &self.moving,
            link_id: link_id.to_string(),
        })
    }

    pub fn is_moving(&self, link_id: &str) -> bool {
        guard(&self.moving).contains(link_id)
    }

    /// Automatic move: skips links that are in flight or already processed.
    pub async fn move_to_category(
        &self,
        link_id: &str,
        category: &str,
        strategy: FolderStrategy,
    ) -> Result<MoveOutcome, MoveError> {
        self.relocate(link_id, category, strategy, true).await
    }

    /// User-initiated move: ignores the processed set.
    pub async fn move_manually(&self, link_id: &str, category: &str) -> Result<MoveOutcome, MoveError> {
        self.relocate(link_id, category, FolderStrategy::Contextual, false).await
    }

    async fn relocate(
        &self,
        link_id: &str,
        category: &str,
        strategy: FolderStrategy,
        respect_processed: bool,
    ) -> Result<MoveOutcome, MoveError> {
        let category = category.trim();
        if category.is_empty() {
            return Err(MoveError::InvalidCategory(category.to_string()));
        }

        let Some(_in_flight) = self.begin(link_id) else {
            debug!(link_id, "move already in flight, skipped");
            return Ok(MoveOutcome::skipped("already moving"));
        };
        if respect_processed && self.is_processed(link_id) {
            return Ok(MoveOutcome::skipped("already processed"));
        }

        let link = self
            .tree
            .get_link(link_id)
            .await?
            .ok_or_else(|| TreeError::NotFound(link_id.to_string()))?;
        let folder_id = self.resolve_destination(category, strategy).await?;

        if respect_processed && self.is_processed(link_id) {
            debug!(link_id, "processed while resolving destination, skipped");
            return Ok(MoveOutcome::skipped("already processed"));
        }

        if link.parent_id.as_deref() != Some(folder_id.as_str()) {
            self.tree.move_link(link_id, &folder_id).await?;
        }
        self.mark_processed(link_id)?;
        self.expect_location(link_id, &folder_id);
        info!(link_id, category, folder_id = %folder_id, "link moved");

        Ok(MoveOutcome {
            moved: true,
            folder_id: Some(folder_id),
            from_folder: link.parent_id,
            skipped_reason: None,
        })
    }

    /// Top-level folder with the exact name, then one inside the staging
    /// container, then a newly created one according to `strategy`.
    async fn resolve_destination(&self, category: &str, strategy: FolderStrategy) -> Result<String, MoveError> {
        let roots = self.tree.root_containers().await?;
        let first_root = roots.first().cloned().ok_or(MoveError::NoRootContainer)?;
        let staging_name = self.settings.organizer().staging_folder_name;

        let mut staging: Option<FolderNode> = None;
        for root in &roots {
            for child in self.tree.children_folders(&root.id).await? {
                if child.title == category {
                    return Ok(child.id);
                }
                if staging.is_none() && child.title == staging_name {
                    staging = Some(child);
                }
            }
        }

        if let Some(container) = &staging {
            if let Some(existing) = self
                .tree
                .children_folders(&container.id)
                .await?
                .into_iter()
                .find(|f| f.title == category)
            {
                return Ok(existing.id);
            }
        }

        let parent = match strategy {
            FolderStrategy::Contextual => first_root,
            FolderStrategy::AlwaysUseStaging => match staging {
                Some(container) => container,
                None => {
                    info!(name = %staging_name, "creating staging container");
                    self.tree.create_folder(&first_root.id, &staging_name).await?
                }
            },
        };
        let created = self.tree.create_folder(&parent.id, category).await?;
        info!(category, parent = %parent.title, "category folder created");
        Ok(created.id)
    }

    // ─── Processed set ───

    pub fn is_processed(&self, link_id: &str) -> bool {
        guard(&self.processed).contains(link_id)
    }

    pub fn processed_ids(&self) -> HashSet<String> {
        guard(&self.processed).clone()
    }

    pub fn mark_processed(&self, link_id: &str) -> Result<(), StoreError> {
        if guard(&self.processed).insert(link_id.to_string()) {
            self.persist_processed()?;
        }
        Ok(())
    }

    pub fn unmark_processed(&self, link_id: &str) -> Result<bool, StoreError> {
        let removed = guard(&self.processed).remove(link_id);
        if removed {
            self.persist_processed()?;
        }
        Ok(removed)
    }

    pub fn clear_processed(&self) -> Result<(), StoreError> {
        guard(&self.processed).clear();
        self.persist_processed()
    }

    fn persist_processed(&self) -> Result<(), StoreError> {
        let mut ids: Vec<String> = guard(&self.processed).iter().cloned().collect();
        ids.sort();
        self.store.save(KEY_PROCESSED, &ids)
    }

    // ─── Expected locations ───

    fn expect_location(&self, link_id: &str, folder_id: &str) {
        let ttl = Duration::from_secs(self.settings.organizer().expected_location_ttl_secs);
        guard(&self.expected).insert(
            link_id.to_string(),
            ExpectedLocation {
                folder_id: folder_id.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn forget_expected(&self, link_id: &str) {
        guard(&self.expected).remove(link_id);
    }

    /// Live hint for `link_id`; expired hints are dropped on the way.
    pub fn expected_folder(&self, link_id: &str) -> Option<String> {
        let mut expected = guard(&self.expected);
        let now = Instant::now();
        expected.retain(|_, hint| hint.expires_at > now);
        expected.get(link_id).map(|hint| hint.folder_id.clone())
    }

    /// Handles a move made by someone else. Returns `true` when it contradicted
    /// a live expected-location hint (reported as interference).
    pub async fn on_external_move(&self, link_id: &str, new_parent_id: &str) -> Result<bool, MoveError> {
        if self.is_moving(link_id) {
            return Ok(false);
        }
        let Some(expected) = self.expected_folder(link_id) else {
            return Ok(false);
        };
        if expected == new_parent_id {
            return Ok(false);
        }

        warn!(link_id, expected = %expected, actual = new_parent_id, "link moved away from its organized folder");
        let mut reverted = false;
        if self.settings.organizer().revert_interference {
            if let Some(_in_flight) = self.begin(link_id) {
                match self.tree.move_link(link_id, &expected).await {
                    Ok(()) => {
                        reverted = true;
                        info!(link_id, folder_id = %expected, "interfering move reverted");
                    }
                    Err(e) => warn!(link_id, error = %e, "could not revert interfering move"),
                }
            }
        }
        // One report (and at most one revert) per hint.
        self.forget_expected(link_id);

        self.events.emit(OrganizeEvent::Interference {
            link_id: link_id.to_string(),
            expected_folder: expected,
            actual_folder: new_parent_id.to_string(),
            reverted,
        });
        Ok(true)
    }
}
