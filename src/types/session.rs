use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of an organize session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Cancelled,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Error => "error",
        }
    }

    /// Terminal states end up in the history archive.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Error
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of organizing one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// The link was moved into its category folder.
    Completed,
    /// Classified below the confidence threshold; awaiting user confirmation.
    Pending,
    Error,
}

/// One step of an organize session. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizeRecord {
    pub id: String,
    #[serde(rename = "bookmarkId")]
    pub link_id: String,
    #[serde(rename = "bookmarkTitle")]
    pub link_title: String,
    #[serde(rename = "bookmarkUrl")]
    pub link_url: String,
    pub from_folder: Option<String>,
    pub from_folder_title: Option<String>,
    pub to_folder: String,
    pub timestamp: i64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub status: RecordStatus,
}

impl OrganizeRecord {
    /// Builds a record with a fresh id and the current time.
    pub fn new(link_id: &str, link_title: &str, link_url: &str, to_folder: &str, status: RecordStatus) -> Self {
        Self {
            id: format!("record_{}", Uuid::new_v4().simple()),
            link_id: link_id.to_string(),
            link_title: link_title.to_string(),
            link_url: link_url.to_string(),
            from_folder: None,
            from_folder_title: None,
            to_folder: to_folder.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            confidence: 0.0,
            reasoning: None,
            status,
        }
    }

    pub fn with_origin(mut self, folder_id: Option<String>, folder_title: Option<String>) -> Self {
        self.from_folder = folder_id;
        self.from_folder_title = folder_title;
        self
    }

    /// Non-finite confidences are stored as 0.0 so the record stays serializable.
    pub fn with_confidence(mut self, confidence: f64, reasoning: Option<String>) -> Self {
        self.confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        self.reasoning = reasoning;
        self
    }
}

/// One batch-organize run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizeSession {
    pub id: String,
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(rename = "totalBookmarks")]
    pub total_links: usize,
    #[serde(rename = "processedBookmarks")]
    pub processed_count: usize,
    pub status: SessionStatus,
    pub records: Vec<OrganizeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<i64>,
    #[serde(
        rename = "remainingBookmarkIds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub remaining_link_ids: Option<Vec<String>>,
}

impl OrganizeSession {
    pub fn new(total_links: usize) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: format!("session_{}_{}", now, Uuid::new_v4().simple()),
            start_time: now,
            end_time: None,
            total_links,
            processed_count: 0,
            status: SessionStatus::Running,
            records: Vec::new(),
            paused_at: None,
            remaining_link_ids: None,
        }
    }
}
