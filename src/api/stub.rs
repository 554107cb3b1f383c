//! In-memory stand-in for the generation backend.
//!
//! Allocates session ids and version numbers the way the real service does and
//! keeps full version records with opaque ids, but the schema, prompt and
//! image it returns are canned placeholders. Useful for local development and
//! for exercising the client end to end.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::client::{ClientError, PrismBackend};
use crate::models::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StubError {
    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("version {0} not found")]
    VersionNotFound(u32),

    #[error("user input must not be empty")]
    EmptyInput,
}

#[derive(Debug)]
struct StoredSession {
    id: String,
    name: Option<String>,
    description: Option<String>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    versions: Vec<VersionRecord>,
}

impl StoredSession {
    fn version(&self, number: u32) -> Result<&VersionRecord, StubError> {
        self.versions
            .iter()
            .find(|v| v.version_number == number)
            .ok_or(StubError::VersionNotFound(number))
    }

    fn next_number(&self) -> u32 {
        self.versions
            .iter()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            name: Some(self.display_name()),
            description: self.description.clone(),
            thumbnail_url: self.versions.last().map(|v| v.image_url.clone()),
            version_count: self.versions.len() as u32,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Project {}", &self.id[..8.min(self.id.len())]))
    }
}

/// Shared handle to the stub's state.
#[derive(Debug, Clone, Default)]
pub struct StubBackend {
    sessions: Arc<Mutex<Vec<StoredSession>>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_sessions<R>(&self, f: impl FnOnce(&mut Vec<StoredSession>) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut sessions)
    }

    fn find<'a>(
        sessions: &'a mut [StoredSession],
        id: &str,
    ) -> Result<&'a mut StoredSession, StubError> {
        sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StubError::SessionNotFound(id.to_string()))
    }

    pub fn preview(&self, user_input: &str) -> Result<PreviewResponse, StubError> {
        let schema = schema_for(user_input)?;
        Ok(PreviewResponse {
            prompt: compile(&schema),
            schema,
        })
    }

    pub fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, StubError> {
        let schema = schema_for(&request.user_input)?;
        self.with_sessions(|sessions| {
            let now = Utc::now();
            let session = match request.session_id {
                Some(ref id) => Self::find(sessions, id)?,
                None => {
                    sessions.push(StoredSession {
                        id: Uuid::new_v4().to_string(),
                        name: None,
                        description: None,
                        created_at: now,
                        updated_at: now,
                        versions: Vec::new(),
                    });
                    let last = sessions.len() - 1;
                    &mut sessions[last]
                }
            };

            let record = new_record(
                session,
                None,
                Some(request.user_input.clone()),
                None,
                schema,
                None,
            );
            session.updated_at = record.created_at;
            let response = GenerateResponse {
                session_id: session.id.clone(),
                version: record.version_number,
                schema: record.schema.clone(),
                prompt: record.prompt.clone(),
                image_url: record.image_url.clone(),
                created_at: record.created_at,
            };
            session.versions.push(record);
            Ok(response)
        })
    }

    pub fn feedback(
        &self,
        session_id: &str,
        request: &FeedbackRequest,
    ) -> Result<FeedbackResponse, StubError> {
        self.with_sessions(|sessions| {
            let session = Self::find(sessions, session_id)?;
            let parent = session.version(request.version)?.clone();
            let (schema, diff) = revise(&parent.schema, &request.feedback);
            Ok(push_revision(
                session,
                &parent,
                None,
                Some(request.feedback.clone()),
                schema,
                Some(diff),
            ))
        })
    }

    pub fn rollback(
        &self,
        session_id: &str,
        request: &RollbackRequest,
    ) -> Result<FeedbackResponse, StubError> {
        self.with_sessions(|sessions| {
            let session = Self::find(sessions, session_id)?;
            let target = session.version(request.target_version)?.clone();
            let (schema, diff) = match request.new_feedback {
                Some(ref feedback) => {
                    let (schema, diff) = revise(&target.schema, feedback);
                    (schema, Some(diff))
                }
                None => (target.schema.clone(), None),
            };
            Ok(push_revision(
                session,
                &target,
                None,
                request.new_feedback.clone(),
                schema,
                diff,
            ))
        })
    }

    pub fn history(&self, session_id: &str) -> Result<SessionHistory, StubError> {
        self.with_sessions(|sessions| {
            let session = Self::find(sessions, session_id)?;
            Ok(SessionHistory {
                session_id: session.id.clone(),
                name: session.name.clone(),
                description: session.description.clone(),
                created_at: Some(session.created_at),
                updated_at: Some(session.updated_at),
                versions: session.versions.clone(),
            })
        })
    }

    /// Sessions ordered by most recent activity.
    pub fn list(&self, skip: u32, limit: u32) -> SessionList {
        self.with_sessions(|sessions| {
            let mut summaries: Vec<SessionSummary> =
                sessions.iter().map(StoredSession::summary).collect();
            summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            SessionList {
                total: summaries.len() as u64,
                sessions: summaries
                    .into_iter()
                    .skip(skip as usize)
                    .take(limit as usize)
                    .collect(),
            }
        })
    }

    pub fn update(&self, session_id: &str, patch: &SessionPatch) -> Result<UpdatedSession, StubError> {
        self.with_sessions(|sessions| {
            let session = Self::find(sessions, session_id)?;
            if let Some(ref name) = patch.name {
                session.name = Some(name.clone());
            }
            if let Some(ref description) = patch.description {
                session.description = Some(description.clone());
            }
            session.updated_at = Utc::now();
            Ok(UpdatedSession {
                id: session.id.clone(),
                name: Some(session.display_name()),
                description: session.description.clone(),
            })
        })
    }

    pub fn delete(&self, session_id: &str) -> Result<DeletedSession, StubError> {
        self.with_sessions(|sessions| {
            let before = sessions.len();
            sessions.retain(|s| s.id != session_id);
            if sessions.len() == before {
                return Err(StubError::SessionNotFound(session_id.to_string()));
            }
            Ok(DeletedSession {
                status: "deleted".to_string(),
                session_id: session_id.to_string(),
            })
        })
    }
}

fn new_record(
    session: &StoredSession,
    parent: Option<&VersionRecord>,
    user_input: Option<String>,
    user_feedback: Option<String>,
    schema: PromptSchema,
    diff: Option<PromptDiff>,
) -> VersionRecord {
    let id = Uuid::new_v4();
    VersionRecord {
        id: id.to_string(),
        session_id: session.id.clone(),
        version_number: session.next_number(),
        parent_version_id: parent.map(|p| p.id.clone()),
        user_input,
        user_feedback,
        prompt: compile(&schema),
        schema,
        diff,
        image_url: format!("https://picsum.photos/seed/{}/1920/1080", id.simple()),
        created_at: Utc::now(),
    }
}

fn push_revision(
    session: &mut StoredSession,
    parent: &VersionRecord,
    user_input: Option<String>,
    user_feedback: Option<String>,
    schema: PromptSchema,
    diff: Option<PromptDiff>,
) -> FeedbackResponse {
    let record = new_record(session, Some(parent), user_input, user_feedback, schema, diff);
    session.updated_at = record.created_at;
    let response = FeedbackResponse {
        session_id: session.id.clone(),
        version: record.version_number,
        parent_version: parent.version_number,
        diff: record.diff.clone(),
        schema: record.schema.clone(),
        prompt: record.prompt.clone(),
        image_url: record.image_url.clone(),
        created_at: record.created_at,
    };
    session.versions.push(record);
    response
}

fn schema_for(user_input: &str) -> Result<PromptSchema, StubError> {
    let user_input = user_input.trim();
    if user_input.is_empty() {
        return Err(StubError::EmptyInput);
    }
    Ok(PromptSchema {
        subject: vec![user_input.to_string()],
        style: vec!["semi-realistic".to_string()],
        quality: vec!["high detail".to_string(), "16:9".to_string()],
        negative: vec!["blurry".to_string(), "deformed".to_string()],
        weights: [("style".to_string(), 1.0)].into_iter().collect(),
        ..PromptSchema::default()
    })
}

/// Record feedback as an appearance note.
fn revise(schema: &PromptSchema, feedback: &str) -> (PromptSchema, PromptDiff) {
    let mut revised = schema.clone();
    revised.appearance.push(feedback.to_string());
    let diff = PromptDiff {
        operations: vec![DiffOperation {
            action: "add".to_string(),
            field: "appearance".to_string(),
            values: vec![feedback.to_string()],
            delta: None,
        }],
        reasoning: Some(format!("applied feedback \"{}\"", feedback)),
    };
    (revised, diff)
}

fn compile(schema: &PromptSchema) -> String {
    let sections = [
        ("Subject", &schema.subject),
        ("Appearance", &schema.appearance),
        ("Style", &schema.style),
        ("Composition", &schema.composition),
        ("Lighting", &schema.lighting),
        ("Background", &schema.background),
        ("Quality", &schema.quality),
        ("Avoid", &schema.negative),
    ];
    sections
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(title, values)| format!("{}: {}", title, values.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<StubError> for ClientError {
    fn from(e: StubError) -> Self {
        match e {
            StubError::EmptyInput => ClientError::BadRequest(e.to_string()),
            _ => ClientError::NotFound(e.to_string()),
        }
    }
}

/// In-process use, without HTTP in between.
#[async_trait]
impl PrismBackend for StubBackend {
    async fn preview(&self, request: &PreviewRequest) -> Result<PreviewResponse, ClientError> {
        Ok(StubBackend::preview(self, &request.user_input)?)
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ClientError> {
        Ok(StubBackend::generate(self, request)?)
    }

    async fn feedback(&self, request: &FeedbackRequest) -> Result<FeedbackResponse, ClientError> {
        Ok(StubBackend::feedback(self, &request.session_id, request)?)
    }

    async fn rollback(
        &self,
        session_id: &str,
        request: &RollbackRequest,
    ) -> Result<FeedbackResponse, ClientError> {
        Ok(StubBackend::rollback(self, session_id, request)?)
    }

    async fn get_versions(&self, session_id: &str) -> Result<SessionHistory, ClientError> {
        Ok(self.history(session_id)?)
    }

    async fn list_sessions(&self, offset: u32, limit: u32) -> Result<SessionList, ClientError> {
        Ok(self.list(offset, limit))
    }

    async fn update_session(
        &self,
        session_id: &str,
        patch: &SessionPatch,
    ) -> Result<UpdatedSession, ClientError> {
        Ok(self.update(session_id, patch)?)
    }

    async fn delete_session(&self, session_id: &str) -> Result<DeletedSession, ClientError> {
        Ok(self.delete(session_id)?)
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        Ok(HealthStatus {
            status: "healthy".to_string(),
        })
    }
}
