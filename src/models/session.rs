//! Session record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable session metadata, decoupled from any runtime state.
///
/// A record outlives the process it describes: it is created on first open,
/// touched on every dispatch, and survives application restarts so the
/// session can be offered for resumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionRecord {
    /// Unique record identifier.
    pub id: String,
    /// Display name shown in the session switcher.
    pub name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last dispatch timestamp; drives retention and resume ordering.
    pub last_activity_at: DateTime<Utc>,
    /// Opaque token from the external CLI requesting restoration of prior
    /// conversational state. Absent means fresh-session-only.
    pub resume_token: Option<String>,
    /// Working directory the external CLI was started in.
    pub working_directory: Option<String>,
    /// Non-owning back-reference to an owning project, if matched.
    pub project_id: Option<String>,
}

impl SessionRecord {
    /// Construct a new record with a generated identifier.
    #[must_use]
    pub fn new(name: String, working_directory: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: now,
            last_activity_at: now,
            resume_token: None,
            working_directory,
            project_id: None,
        }
    }

    /// Set `last_activity_at` to now.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Whether this record can request restoration of prior CLI state.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.resume_token.is_some()
    }
}
