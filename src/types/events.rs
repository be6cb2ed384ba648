use serde::{Deserialize, Serialize};

use super::session::{OrganizeRecord, SessionStatus};

/// Notifications published while the engine works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrganizeEvent {
    Progress {
        session_id: String,
        processed: usize,
        total: usize,
        record: OrganizeRecord,
    },
    Paused {
        session_id: String,
        processed: usize,
        remaining: usize,
    },
    Finished {
        session_id: String,
        status: SessionStatus,
        processed: usize,
        total: usize,
    },
    Error {
        session_id: Option<String>,
        message: String,
    },
    /// A link the engine just placed was moved somewhere else.
    Interference {
        link_id: String,
        expected_folder: String,
        actual_folder: String,
        reverted: bool,
    },
    /// A single link was auto-filed outside of a batch run.
    LinkOrganized {
        link_id: String,
        category: String,
        folder_id: String,
    },
}
