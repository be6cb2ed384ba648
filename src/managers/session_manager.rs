//! Organize sessions: the running/paused/finished state machine, the history
//! archive and undo.
//!
//! At most one session is live at a time. Its snapshot is written to the
//! state store after every change so a restart can pick a paused run back up.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::managers::bookmark_tree::BookmarkTree;
use crate::managers::move_coordinator::MoveCoordinator;
use crate::services::event_sink::EventSink;
use crate::services::settings_engine::SettingsEngine;
use crate::services::state_store::{StateStore, StateStoreExt, KEY_CURRENT_SESSION, KEY_HISTORY};
use crate::types::errors::{MoveError, SessionError, StoreError};
use crate::types::events::OrganizeEvent;
use crate::types::session::{OrganizeRecord, OrganizeSession, SessionStatus};

/// Archived sessions consulted by [`SessionManager::recent_records`].
const RECENT_SESSIONS: usize = 5;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub struct SessionManager {
    store: Arc<dyn StateStore>,
    tree: Arc<dyn BookmarkTree>,
    coordinator: Arc<MoveCoordinator>,
    settings: Arc<SettingsEngine>,
    events: Arc<dyn EventSink>,
    current: Mutex<Option<OrganizeSession>>,
    history: Mutex<Vec<OrganizeSession>>,
}

fn invalid_state(session: &OrganizeSession, expected: SessionStatus) -> SessionError {
    SessionError::InvalidState {
        id: session.id.clone(),
        status: session.status.to_string(),
        expected: expected.to_string(),
    }
}

impl SessionManager {
    /// Loads the current session and history. A session still marked running
    /// was interrupted by a restart; it is archived as an error.
    pub fn new(
        store: Arc<dyn StateStore>,
        tree: Arc<dyn BookmarkTree>,
        coordinator: Arc<MoveCoordinator>,
        settings: Arc<SettingsEngine>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, StoreError> {
        let current: Option<OrganizeSession> = store.load(KEY_CURRENT_SESSION)?;
        let history: Vec<OrganizeSession> = store.load(KEY_HISTORY)?.unwrap_or_default();

        let manager = Self {
            store,
            tree,
            coordinator,
            settings,
            events,
            current: Mutex::new(None),
            history: Mutex::new(history),
        };

        match current {
            Some(mut stale) if stale.status == SessionStatus::Running => {
                warn!(session_id = %stale.id, "interrupted session archived as error");
                stale.status = SessionStatus::Error;
                stale.end_time = Some(Utc::now().timestamp_millis());
                manager.archive(stale)?;
                manager.store.remove(KEY_CURRENT_SESSION)?;
            }
            other => *manager.current() = other,
        }
        Ok(manager)
    }

    fn current(&self) -> MutexGuard<'_, Option<OrganizeSession>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn archived(&self) -> MutexGuard<'_, Vec<OrganizeSession>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist_current(&self, session: &OrganizeSession) -> Result<(), StoreError> {
        self.store.save(KEY_CURRENT_SESSION, session)
    }

    /// Puts `session` at the front of the history and prunes by age and count.
    fn archive(&self, session: OrganizeSession) -> Result<(), StoreError> {
        let organizer = self.settings.organizer();
        let cutoff = Utc::now().timestamp_millis() - i64::from(organizer.history_retention_days) * MILLIS_PER_DAY;

        let mut history = self.archived();
        history.insert(0, session);
        history.retain(|s| s.start_time >= cutoff);
        history.truncate(organizer.history_max_sessions.max(1));
        self.store.save(KEY_HISTORY, &*history)
    }

    /// Opens a new running session. A paused session is archived as paused.
    pub fn start(&self, total_links: usize) -> Result<String, SessionError> {
        let mut current = self.current();
        if let Some(existing) = current.as_ref() {
            if existing.status == SessionStatus::Running {
                return Err(SessionError::AlreadyRunning(existing.id.clone()));
            }
        }
        if let Some(mut previous) = current.take() {
            info!(session_id = %previous.id, status = %previous.status, "previous session archived");
            if previous.end_time.is_none() {
                previous.end_time = Some(Utc::now().timestamp_millis());
            }
            self.archive(previous)?;
        }

        let session = OrganizeSession::new(total_links);
        let id = session.id.clone();
        self.persist_current(&session)?;
        *current = Some(session);
        info!(session_id = %id, total_links, "organize session started");
        Ok(id)
    }

    /// Appends a record to the running session.
    pub fn record_step(&self, record: OrganizeRecord) -> Result<(), SessionError> {
        let event = {
            let mut current = self.current();
            let session = current.as_mut().ok_or(SessionError::NoActiveSession)?;
            if session.status != SessionStatus::Running {
                return Err(invalid_state(session, SessionStatus::Running));
            }
            session.records.push(record.clone());
            session.processed_count += 1;
            self.persist_current(session)?;
            OrganizeEvent::Progress {
                session_id: session.id.clone(),
                processed: session.processed_count,
                total: session.total_links,
                record,
            }
        };
        self.events.emit(event);
        Ok(())
    }

    /// Freezes the running session with the ids still to do.
    pub fn pause(&self, remaining_ids: Vec<String>) -> Result<(), SessionError> {
        let event = {
            let mut current = self.current();
            let session = current.as_mut().ok_or(SessionError::NoActiveSession)?;
            if session.status != SessionStatus::Running {
                return Err(invalid_state(session, SessionStatus::Running));
            }
            let remaining = remaining_ids.len();
            session.status = SessionStatus::Paused;
            session.paused_at = Some(Utc::now().timestamp_millis());
            session.remaining_link_ids = Some(remaining_ids);
            self.persist_current(session)?;
            info!(session_id = %session.id, processed = session.processed_count, remaining, "organize session paused");
            OrganizeEvent::Paused {
                session_id: session.id.clone(),
                processed: session.processed_count,
                remaining,
            }
        };
        self.events.emit(event);
        Ok(())
    }

    /// Continues a paused session and hands back its remaining ids.
    pub fn resume(&self) -> Result<Vec<String>, SessionError> {
        let mut current = self.current();
        let session = current.as_mut().ok_or(SessionError::NoActiveSession)?;
        if session.status != SessionStatus::Paused {
            return Err(invalid_state(session, SessionStatus::Paused));
        }
        session.status = SessionStatus::Running;
        session.paused_at = None;
        let remaining = session.remaining_link_ids.take().unwrap_or_default();
        self.persist_current(session)?;
        info!(session_id = %session.id, remaining = remaining.len(), "organize session resumed");
        Ok(remaining)
    }

    /// Finishes the live session with `status` and archives it.
    pub fn end(&self, status: SessionStatus) -> Result<OrganizeSession, SessionError> {
        let mut session = self.current().take().ok_or(SessionError::NoActiveSession)?;
        session.status = status;
        session.end_time = Some(Utc::now().timestamp_millis());
        if status.is_terminal() {
            session.remaining_link_ids = None;
        }

        self.archive(session.clone())?;
        self.store.remove(KEY_CURRENT_SESSION)?;
        info!(
            session_id = %session.id,
            status = %status,
            processed = session.processed_count,
            total = session.total_links,
            "organize session ended"
        );
        self.events.emit(OrganizeEvent::Finished {
            session_id: session.id.clone(),
            status,
            processed: session.processed_count,
            total: session.total_links,
        });
        Ok(session)
    }

    pub fn current_session(&self) -> Option<OrganizeSession> {
        self.current().clone()
    }

    pub fn is_paused(&self) -> bool {
        self.current()
            .as_ref()
            .is_some_and(|s| s.status == SessionStatus::Paused)
    }

    pub fn is_running(&self) -> bool {
        self.current()
            .as_ref()
            .is_some_and(|s| s.status == SessionStatus::Running)
    }

    /// Archived sessions, newest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<OrganizeSession> {
        let history = self.archived();
        let take = limit.unwrap_or(history.len());
        history.iter().take(take).cloned().collect()
    }

    /// Records of the live session and the newest archived ones, newest first.
    pub fn recent_records(&self, limit: usize) -> Vec<OrganizeRecord> {
        let mut records: Vec<OrganizeRecord> = self
            .current()
            .as_ref()
            .map(|s| s.records.clone())
            .unwrap_or_default();
        for session in self.archived().iter().take(RECENT_SESSIONS) {
            records.extend(session.records.iter().cloned());
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        records
    }

    fn find_record(&self, record_id: &str) -> Option<OrganizeRecord> {
        let in_current = self
            .current()
            .as_ref()
            .and_then(|s| s.records.iter().find(|r| r.id == record_id).cloned());
        in_current.or_else(|| {
            self.archived()
                .iter()
                .flat_map(|s| s.records.iter())
                .find(|r| r.id == record_id)
                .cloned()
        })
    }

    /// Moves the link of `record_id` back where it came from (or into the
    /// first root container when that folder is gone) and forgets that it was
    /// processed. History itself is left untouched.
    pub async fn undo(&self, record_id: &str) -> Result<OrganizeRecord, SessionError> {
        let record = self
            .find_record(record_id)
            .ok_or_else(|| SessionError::RecordNotFound(record_id.to_string()))?;

        let original = match record.from_folder.as_deref() {
            Some(folder_id) => self.tree.get_folder(folder_id).await?,
            None => None,
        };
        let target = match original {
            Some(folder) => folder.id,
            None => {
                debug!(record_id, "original folder missing, restoring to first root");
                self.tree
                    .root_containers()
                    .await?
                    .into_iter()
                    .next()
                    .map(|f| f.id)
                    .ok_or(MoveError::NoRootContainer)?
            }
        };

        self.coordinator.forget_expected(&record.link_id);
        self.tree.move_link(&record.link_id, &target).await?;
        self.coordinator.unmark_processed(&record.link_id)?;
        info!(record_id, link_id = %record.link_id, folder_id = %target, "organize step undone");
        Ok(record)
    }
}
