use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::prompt::{PromptDiff, PromptSchema};
use super::wire::{FeedbackResponse, GenerateResponse};
use crate::lineage::version_id;

/// One immutable point in a session's history.
///
/// The `id` is derived from the session id and the version number (see
/// [`version_id`]), so it never needs a server round trip. Parent references
/// are kept as version numbers; [`Version::parent_version_id`] derives the
/// matching identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub session_id: String,
    pub version_number: u32,
    pub parent_version: Option<u32>,
    pub origin: VersionOrigin,
    pub schema: PromptSchema,
    pub prompt: String,
    #[serde(default)]
    pub diff: Option<PromptDiff>,
    pub image_url: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
}

/// How a version came to exist.
///
/// - `Generated`: a fresh generation from free-form user input
/// - `Feedback`: a revision of a parent driven by user feedback
/// - `Rollback`: a plain copy of an earlier version as a new branch tip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionOrigin {
    Generated { user_input: String },
    Feedback { user_feedback: String },
    Rollback,
}

impl VersionOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated { .. } => "generated",
            Self::Feedback { .. } => "feedback",
            Self::Rollback => "rollback",
        }
    }

    /// The user text that produced the version, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Generated { user_input } => Some(user_input),
            Self::Feedback { user_feedback } => Some(user_feedback),
            Self::Rollback => None,
        }
    }
}

impl Version {
    /// Build the root version recorded for a successful generation.
    pub fn from_generate(response: &GenerateResponse, user_input: impl Into<String>) -> Self {
        Self {
            id: version_id(&response.session_id, response.version),
            session_id: response.session_id.clone(),
            version_number: response.version,
            parent_version: None,
            origin: VersionOrigin::Generated {
                user_input: user_input.into(),
            },
            schema: response.schema.clone(),
            prompt: response.prompt.clone(),
            diff: None,
            image_url: response.image_url.clone(),
            created_at: response.created_at,
        }
    }

    /// Build a revision (feedback or rollback) hanging off `parent`.
    ///
    /// The parent is supplied by the caller rather than read from the
    /// response: for feedback it is the version focused when the request was
    /// issued, for rollback it is the rollback target.
    pub fn from_revision(response: &FeedbackResponse, parent: u32, origin: VersionOrigin) -> Self {
        Self {
            id: version_id(&response.session_id, response.version),
            session_id: response.session_id.clone(),
            version_number: response.version,
            parent_version: Some(parent),
            origin,
            schema: response.schema.clone(),
            prompt: response.prompt.clone(),
            diff: response.diff.clone(),
            image_url: response.image_url.clone(),
            created_at: response.created_at,
        }
    }

    pub fn parent_version_id(&self) -> Option<String> {
        self.parent_version
            .map(|parent| version_id(&self.session_id, parent))
    }

    pub fn is_root(&self) -> bool {
        self.parent_version.is_none()
    }
}
