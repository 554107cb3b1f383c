use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::version::Version;

/// A fully loaded session with its version forest.
///
/// Versions are kept in arrival order, which is also ascending version-number
/// order since the backend allocates numbers monotonically. Lineage rules
/// (parent resolution, monotonic numbers) are enforced by the methods in
/// [`crate::lineage`]; the field is public for reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp")]
    pub updated_at: DateTime<Utc>,
    pub versions: Vec<Version>,
}

impl Session {
    /// An empty session as first seen in a generation response.
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            created_at,
            updated_at: created_at,
            versions: Vec::new(),
        }
    }
}

/// Listing record for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Image of the most recent version, if any.
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub version_count: u32,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// One page of session summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<SessionSummary>,
    pub total: u64,
}

/// Partial update of session metadata. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SessionPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            description: None,
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            name: None,
            description: Some(description.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Metadata echoed back after a successful update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedSession {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Acknowledgement of a session deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedSession {
    pub status: String,
    pub session_id: String,
}
