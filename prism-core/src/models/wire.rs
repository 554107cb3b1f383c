//! Request and response bodies for the generation backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::prompt::{PromptDiff, PromptSchema};

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub user_input: String,
}

/// Generate a first version. Without `session_id` the backend opens a new
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub user_input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Revise `version` of a session according to `feedback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub session_id: String,
    pub version: u32,
    pub feedback: String,
}

/// Branch a new version off `target_version`, optionally editing it first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub target_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_feedback: Option<String>,
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub schema: PromptSchema,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub session_id: String,
    pub version: u32,
    pub schema: PromptSchema,
    pub prompt: String,
    pub image_url: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Returned by both feedback and rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub session_id: String,
    pub version: u32,
    pub parent_version: u32,
    #[serde(default)]
    pub diff: Option<PromptDiff>,
    pub schema: PromptSchema,
    pub prompt: String,
    pub image_url: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
}

/// A version as stored by the backend.
///
/// `id` and `parent_version_id` are the backend's own identifiers and are
/// resolved to version numbers when the history is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: String,
    pub session_id: String,
    pub version_number: u32,
    #[serde(default)]
    pub parent_version_id: Option<String>,
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub user_feedback: Option<String>,
    pub schema: PromptSchema,
    pub prompt: String,
    #[serde(default)]
    pub diff: Option<PromptDiff>,
    pub image_url: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Full version history of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        with = "crate::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "crate::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    pub versions: Vec<VersionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}
