//! The version lineage store.
//!
//! Holds at most one loaded [`Session`] with its version forest, the focused
//! version, the session summary list, an in-flight marker and the last error.
//! Every operation that reaches the backend follows the same contract:
//!
//! 1. claim the single in-flight slot, or fail with [`StoreError::Busy`];
//! 2. call the backend without holding any lock;
//! 3. on success, check the response against the forest and append it
//!    whole; on failure, record a readable message and append nothing.
//!
//! Precondition failures (e.g. feedback with nothing focused) are recorded in
//! [`LineageStore::last_error`] and reported as `Ok(None)`; they never reach
//! the backend.
//!
//! Whenever the loaded session's identity changes, the [`SessionPointer`] is
//! updated synchronously: set to the new id, or cleared when nothing is
//! loaded.

mod flight;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::client::{ClientError, PrismBackend};
use crate::db::SessionPointer;
use crate::models::*;
use crate::tree_render::render_tree;
use crate::LineageError;
use flight::FlightGuard;

/// Page size used when refreshing the session list after a deletion.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

const GENERATE_FAILED: &str = "generation failed";
const FEEDBACK_FAILED: &str = "feedback submission failed";
const ROLLBACK_FAILED: &str = "rollback failed";
const LOAD_FAILED: &str = "failed to load session";
const LIST_FAILED: &str = "failed to list sessions";
const UPDATE_FAILED: &str = "failed to update session";
const DELETE_FAILED: &str = "failed to delete session";
const PREVIEW_FAILED: &str = "preview failed";

const NOTHING_FOCUSED: &str = "generate an image before giving feedback";
const NO_ACTIVE_SESSION: &str = "no active session";
const NOTHING_TO_UPDATE: &str = "nothing to update";
const TIMED_OUT: &str = "the backend did not answer in time";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("another request is already in flight")]
    Busy,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("inconsistent backend response: {0}")]
    Lineage(#[from] LineageError),

    #[error("the active session changed while the request was in flight")]
    Stale,
}

#[derive(Debug, Default)]
struct StoreState {
    session: Option<Session>,
    focus: Option<u32>,
    sessions: Vec<SessionSummary>,
    session_total: u64,
    last_error: Option<String>,
    in_flight: Option<u64>,
    next_ticket: u64,
}

impl StoreState {
    fn session_id(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.id.clone())
    }
}

/// In-memory owner of one session's version forest.
pub struct LineageStore {
    backend: Arc<dyn PrismBackend>,
    pointer: Arc<dyn SessionPointer>,
    state: Mutex<StoreState>,
}

impl LineageStore {
    pub fn new(backend: Arc<dyn PrismBackend>, pointer: Arc<dyn SessionPointer>) -> Self {
        Self {
            backend,
            pointer,
            state: Mutex::new(StoreState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================================
    // Read accessors
    // ============================================================

    pub fn current_session(&self) -> Option<Session> {
        self.state().session.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state().session_id()
    }

    /// Number of the focused version.
    pub fn focus(&self) -> Option<u32> {
        self.state().focus
    }

    pub fn current_version(&self) -> Option<Version> {
        let state = self.state();
        let focus = state.focus?;
        state.session.as_ref()?.version(focus).cloned()
    }

    pub fn latest_version(&self) -> Option<Version> {
        self.state().session.as_ref()?.latest().cloned()
    }

    pub fn has_session(&self) -> bool {
        self.state().session.is_some()
    }

    pub fn has_versions(&self) -> bool {
        self.state()
            .session
            .as_ref()
            .is_some_and(|s| !s.versions.is_empty())
    }

    pub fn version_count(&self) -> usize {
        self.state()
            .session
            .as_ref()
            .map_or(0, |s| s.versions.len())
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.state().sessions.clone()
    }

    /// Total session count reported by the last listing.
    pub fn session_total(&self) -> u64 {
        self.state().session_total
    }

    pub fn is_busy(&self) -> bool {
        self.state().in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    /// Run `f` against the loaded session and the focused version number
    /// without cloning the session.
    pub fn with_session<R>(&self, f: impl FnOnce(&Session, Option<u32>) -> R) -> Option<R> {
        let state = self.state();
        state.session.as_ref().map(|session| f(session, state.focus))
    }

    /// The loaded session's lineage drawn as a tree, focus marked.
    pub fn version_tree(&self) -> Option<String> {
        self.with_session(render_tree)
    }

    // ============================================================
    // Local operations
    // ============================================================

    /// Move focus to an existing version. Returns whether focus moved;
    /// unknown numbers leave the store untouched.
    pub fn switch_focus(&self, version_number: u32) -> bool {
        let mut state = self.state();
        let exists = state
            .session
            .as_ref()
            .is_some_and(|s| s.contains(version_number));
        if exists {
            state.focus = Some(version_number);
        }
        exists
    }

    /// Drop the loaded session, focus, in-flight marker and error.
    ///
    /// The session list is kept. The persisted pointer is cleared through the
    /// identity-change hook.
    pub fn reset(&self) {
        let mut state = self.state();
        self.unload(&mut state);
        state.in_flight = None;
        state.last_error = None;
    }

    // ============================================================
    // Lineage operations
    // ============================================================

    /// Generate a new root version.
    ///
    /// Opens a new session when none is loaded. Returns the backend's response
    /// unchanged.
    pub async fn generate(&self, user_input: &str) -> Result<GenerateResponse, StoreError> {
        let flight = FlightGuard::acquire(self)?;
        let session_id = self.begin();

        let request = GenerateRequest {
            user_input: user_input.to_string(),
            session_id: session_id.clone(),
        };
        let response = self
            .backend
            .generate(&request)
            .await
            .map_err(|e| self.remote_failure(e, GENERATE_FAILED))?;

        let version = Version::from_generate(&response, user_input);
        self.fold(&flight, session_id.as_deref(), GENERATE_FAILED, |store, state| {
            match state.session.as_mut() {
                Some(session) => {
                    session.append(version)?;
                }
                None => {
                    let mut session = Session::new(&response.session_id, response.created_at);
                    session.append(version)?;
                    store.replace_session(state, Some(session));
                }
            }
            state.focus = Some(response.version);
            Ok(())
        })?;

        tracing::info!(
            session_id = %response.session_id,
            version = response.version,
            "generated root version"
        );
        Ok(response)
    }

    /// Revise the focused version with user feedback.
    ///
    /// The new version's parent is the version focused when this call was
    /// made, whatever happens to focus while the request is in flight.
    pub async fn submit_feedback(
        &self,
        feedback: &str,
    ) -> Result<Option<FeedbackResponse>, StoreError> {
        let flight = FlightGuard::acquire(self)?;

        let target = {
            let state = self.state();
            match (&state.session, state.focus) {
                (Some(session), Some(focus)) if session.contains(focus) => {
                    Some((session.id.clone(), focus))
                }
                _ => None,
            }
        };
        let Some((session_id, parent)) = target else {
            self.precondition_failed(NOTHING_FOCUSED);
            return Ok(None);
        };
        self.begin();

        let request = FeedbackRequest {
            session_id: session_id.clone(),
            version: parent,
            feedback: feedback.to_string(),
        };
        let response = self
            .backend
            .feedback(&request)
            .await
            .map_err(|e| self.remote_failure(e, FEEDBACK_FAILED))?;

        if response.parent_version != parent {
            tracing::warn!(
                expected = parent,
                reported = response.parent_version,
                "backend reported a different parent, keeping the focused version"
            );
        }

        let version = Version::from_revision(
            &response,
            parent,
            VersionOrigin::Feedback {
                user_feedback: feedback.to_string(),
            },
        );
        self.append_revision(&flight, &session_id, version, FEEDBACK_FAILED)?;

        tracing::info!(
            session_id = %session_id,
            version = response.version,
            parent,
            "appended feedback version"
        );
        Ok(Some(response))
    }

    /// Branch a new version off `version_number`.
    ///
    /// History is never rewritten: the result is a new tip whose parent is the
    /// target, which need not be the latest or the focused version.
    pub async fn rollback_to(
        &self,
        version_number: u32,
    ) -> Result<Option<FeedbackResponse>, StoreError> {
        self.rollback_with_feedback(version_number, None).await
    }

    /// Like [`rollback_to`](Self::rollback_to), with an edit applied on top
    /// of the target by the backend.
    pub async fn rollback_with_feedback(
        &self,
        version_number: u32,
        feedback: Option<&str>,
    ) -> Result<Option<FeedbackResponse>, StoreError> {
        let flight = FlightGuard::acquire(self)?;

        let target = {
            let state = self.state();
            state
                .session
                .as_ref()
                .map(|s| (s.id.clone(), s.contains(version_number)))
        };
        let session_id = match target {
            None => {
                self.precondition_failed(NO_ACTIVE_SESSION);
                return Ok(None);
            }
            Some((_, false)) => {
                self.precondition_failed(&format!("version {} does not exist", version_number));
                return Ok(None);
            }
            Some((session_id, true)) => session_id,
        };
        self.begin();

        let request = RollbackRequest {
            target_version: version_number,
            new_feedback: feedback.map(str::to_string),
        };
        let response = self
            .backend
            .rollback(&session_id, &request)
            .await
            .map_err(|e| self.remote_failure(e, ROLLBACK_FAILED))?;

        let origin = match feedback {
            Some(text) => VersionOrigin::Feedback {
                user_feedback: text.to_string(),
            },
            None => VersionOrigin::Rollback,
        };
        let version = Version::from_revision(&response, version_number, origin);
        self.append_revision(&flight, &session_id, version, ROLLBACK_FAILED)?;

        tracing::info!(
            session_id = %session_id,
            version = response.version,
            target = version_number,
            "appended rollback version"
        );
        Ok(Some(response))
    }

    // ============================================================
    // Session operations
    // ============================================================

    /// Replace the loaded session with the backend's full history.
    ///
    /// Focus moves to the last version, or to nothing for an empty session.
    /// If the history fails validation the current session is kept.
    pub async fn load_session(&self, session_id: &str) -> Result<(), StoreError> {
        let flight = FlightGuard::acquire(self)?;
        self.load_session_inner(&flight, session_id).await
    }

    /// Alias of [`load_session`](Self::load_session) for session pickers.
    pub async fn switch_to_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.load_session(session_id).await
    }

    async fn load_session_inner(
        &self,
        flight: &FlightGuard<'_>,
        session_id: &str,
    ) -> Result<(), StoreError> {
        self.begin();
        let history = self
            .backend
            .get_versions(session_id)
            .await
            .map_err(|e| self.remote_failure(e, LOAD_FAILED))?;

        let mut session = Session::from_history(history).map_err(|e| {
            let mut state = self.state();
            self.lineage_failure(&mut state, e, LOAD_FAILED)
        })?;

        let mut state = self.state();
        if !flight.is_current(&state) {
            tracing::warn!(%session_id, "Discarding history fetched before a reset");
            return Err(StoreError::Stale);
        }
        if let Some(summary) = state.sessions.iter().find(|s| s.id == session.id) {
            if session.name.is_none() {
                session.name = summary.name.clone();
            }
            if session.description.is_none() {
                session.description = summary.description.clone();
            }
        }
        state.focus = session.latest().map(|v| v.version_number);
        tracing::info!(
            session_id = %session.id,
            versions = session.versions.len(),
            "loaded session"
        );
        self.replace_session(&mut state, Some(session));
        Ok(())
    }

    /// Restore the last-active session at startup.
    ///
    /// Never fails. If the persisted session cannot be loaded (deleted on the
    /// backend, network down) the pointer is cleared and the store is left
    /// empty.
    pub async fn hydrate(&self) {
        let saved = match self.pointer.load() {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!("Failed to read persisted session pointer: {:#}", e);
                return;
            }
        };
        let Some(session_id) = saved else {
            return;
        };
        let Ok(flight) = FlightGuard::acquire(self) else {
            tracing::warn!("Skipping hydration, a request is already in flight");
            return;
        };

        match self.load_session_inner(&flight, &session_id).await {
            Ok(()) => tracing::info!(%session_id, "restored session"),
            Err(e) => {
                tracing::warn!(%session_id, "Failed to restore session, forgetting it: {}", e);
                let mut state = self.state();
                self.unload(&mut state);
                state.last_error = None;
                drop(state);
                if let Err(e) = self.pointer.clear() {
                    tracing::warn!("Failed to clear persisted session pointer: {:#}", e);
                }
            }
        }
    }

    /// Fetch a page of session summaries into the session list.
    pub async fn list_sessions(&self, offset: u32, limit: u32) -> Result<SessionList, StoreError> {
        let _flight = FlightGuard::acquire(self)?;
        self.list_sessions_inner(offset, limit).await
    }

    async fn list_sessions_inner(&self, offset: u32, limit: u32) -> Result<SessionList, StoreError> {
        self.begin();
        let list = self
            .backend
            .list_sessions(offset, limit)
            .await
            .map_err(|e| self.remote_failure(e, LIST_FAILED))?;

        let mut state = self.state();
        state.sessions = list.sessions.clone();
        state.session_total = list.total;
        Ok(list)
    }

    /// Rename the loaded session.
    pub async fn rename_session(&self, name: &str) -> Result<Option<UpdatedSession>, StoreError> {
        self.update_session(SessionPatch::name(name)).await
    }

    /// Change the loaded session's description.
    pub async fn describe_session(
        &self,
        description: &str,
    ) -> Result<Option<UpdatedSession>, StoreError> {
        self.update_session(SessionPatch::description(description))
            .await
    }

    /// Patch the loaded session's metadata.
    ///
    /// Local copies (the loaded session and its summary-list entry) change
    /// only once the backend has confirmed the update.
    pub async fn update_session(
        &self,
        patch: SessionPatch,
    ) -> Result<Option<UpdatedSession>, StoreError> {
        let _flight = FlightGuard::acquire(self)?;
        let loaded = self.state().session_id();
        let Some(session_id) = loaded else {
            self.precondition_failed(NO_ACTIVE_SESSION);
            return Ok(None);
        };
        if patch.is_empty() {
            self.precondition_failed(NOTHING_TO_UPDATE);
            return Ok(None);
        }
        self.begin();

        let updated = self
            .backend
            .update_session(&session_id, &patch)
            .await
            .map_err(|e| self.remote_failure(e, UPDATE_FAILED))?;

        let mut state = self.state();
        if let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) {
            apply_patch(&mut session.name, &mut session.description, &patch);
        }
        if let Some(summary) = state.sessions.iter_mut().find(|s| s.id == session_id) {
            apply_patch(&mut summary.name, &mut summary.description, &patch);
        }
        Ok(Some(updated))
    }

    /// Delete a session on the backend, then refresh the first page of the
    /// session list. Deleting the loaded session unloads it.
    pub async fn delete_session(&self, session_id: &str) -> Result<DeletedSession, StoreError> {
        let _flight = FlightGuard::acquire(self)?;
        self.begin();

        let deleted = self
            .backend
            .delete_session(session_id)
            .await
            .map_err(|e| self.remote_failure(e, DELETE_FAILED))?;

        {
            let mut state = self.state();
            if state.session.as_ref().is_some_and(|s| s.id == session_id) {
                self.unload(&mut state);
                state.last_error = None;
            }
        }
        tracing::info!(%session_id, "deleted session");

        self.list_sessions_inner(0, DEFAULT_PAGE_SIZE).await?;
        Ok(deleted)
    }

    // ============================================================
    // Pass-through operations
    // ============================================================

    /// Compile a prompt without creating a version.
    pub async fn preview(&self, user_input: &str) -> Result<PreviewResponse, StoreError> {
        let request = PreviewRequest {
            user_input: user_input.to_string(),
        };
        self.backend
            .preview(&request)
            .await
            .map_err(|e| self.remote_failure(e, PREVIEW_FAILED))
    }

    pub async fn health(&self) -> Result<HealthStatus, StoreError> {
        Ok(self.backend.health().await?)
    }

    // ============================================================
    // Internals
    // ============================================================

    /// Clear the previous error before a remote call. Returns the loaded
    /// session id, captured for the staleness check.
    fn begin(&self) -> Option<String> {
        let mut state = self.state();
        state.last_error = None;
        state.session_id()
    }

    fn precondition_failed(&self, message: &str) {
        tracing::debug!("precondition failed: {}", message);
        self.state().last_error = Some(message.to_string());
    }

    fn remote_failure(&self, error: ClientError, fallback: &str) -> StoreError {
        let message = if error.is_timeout() {
            format!("{}: {}", fallback, TIMED_OUT)
        } else {
            error.remote_message().unwrap_or(fallback).to_string()
        };
        tracing::warn!("{}: {}", fallback, error);
        self.state().last_error = Some(message);
        StoreError::Client(error)
    }

    fn lineage_failure(
        &self,
        state: &mut StoreState,
        error: LineageError,
        fallback: &str,
    ) -> StoreError {
        tracing::warn!("{}: {}", fallback, error);
        state.last_error = Some(format!("{}: {}", fallback, error));
        StoreError::Lineage(error)
    }

    /// Fold a successful response into the state.
    ///
    /// Rejects the response if `reset()` revoked the flight or the loaded
    /// session changed since the call was issued. `apply` must check before
    /// it mutates; an error from it means nothing changed.
    fn fold<T>(
        &self,
        flight: &FlightGuard<'_>,
        issued_for: Option<&str>,
        fallback: &str,
        apply: impl FnOnce(&Self, &mut StoreState) -> Result<T, LineageError>,
    ) -> Result<T, StoreError> {
        let mut state = self.state();
        if !flight.is_current(&state)
            || state.session.as_ref().map(|s| s.id.as_str()) != issued_for
        {
            tracing::warn!("Discarding response for a session that is no longer loaded");
            state.last_error = Some(format!("{}: session changed", fallback));
            return Err(StoreError::Stale);
        }
        apply(self, &mut *state).map_err(|e| self.lineage_failure(&mut state, e, fallback))
    }

    fn append_revision(
        &self,
        flight: &FlightGuard<'_>,
        session_id: &str,
        version: Version,
        fallback: &str,
    ) -> Result<(), StoreError> {
        let version_number = version.version_number;
        tracing::debug!(
            version = version_number,
            origin = version.origin.as_str(),
            "folding revision"
        );
        self.fold(flight, Some(session_id), fallback, |_, state| {
            if let Some(session) = state.session.as_mut() {
                session.append(version)?;
            }
            state.focus = Some(version_number);
            Ok(())
        })
    }

    fn unload(&self, state: &mut StoreState) {
        state.focus = None;
        self.replace_session(state, None);
    }

    /// Swap the loaded session and run the identity-change hook if the id
    /// changed.
    fn replace_session(&self, state: &mut StoreState, session: Option<Session>) {
        let before = state.session_id();
        state.session = session;
        let after = state.session.as_ref().map(|s| s.id.as_str());
        if before.as_deref() != after {
            self.on_session_changed(after);
        }
    }

    fn on_session_changed(&self, session_id: Option<&str>) {
        let result = match session_id {
            Some(id) => self.pointer.store(id),
            None => self.pointer.clear(),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to persist session pointer: {:#}", e);
        }
    }
}

fn apply_patch(name: &mut Option<String>, description: &mut Option<String>, patch: &SessionPatch) {
    if let Some(ref new_name) = patch.name {
        *name = Some(new_name.clone());
    }
    if let Some(ref new_description) = patch.description {
        *description = Some(new_description.clone());
    }
}
