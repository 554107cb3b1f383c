use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::stub::{StubBackend, StubError};
use crate::models::*;

/// Errors leave the stub as `{"detail": "..."}`, the shape the real backend uses.
impl IntoResponse for StubError {
    fn into_response(self) -> Response {
        let status = match self {
            StubError::SessionNotFound(_) | StubError::VersionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            StubError::EmptyInput => StatusCode::UNPROCESSABLE_ENTITY,
        };
        tracing::warn!(%status, error = %self, "stub request failed");
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
    })
}

// ============================================================
// Generation
// ============================================================

pub async fn preview(
    State(stub): State<StubBackend>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, StubError> {
    stub.preview(&request.user_input).map(Json)
}

pub async fn generate(
    State(stub): State<StubBackend>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, StubError> {
    stub.generate(&request).map(Json)
}

pub async fn feedback(
    State(stub): State<StubBackend>,
    Path(id): Path<String>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, StubError> {
    stub.feedback(&id, &request).map(Json)
}

pub async fn rollback(
    State(stub): State<StubBackend>,
    Path(id): Path<String>,
    Json(request): Json<RollbackRequest>,
) -> Result<Json<FeedbackResponse>, StubError> {
    stub.rollback(&id, &request).map(Json)
}

// ============================================================
// Sessions
// ============================================================

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    skip: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    20
}

pub async fn list_sessions(
    State(stub): State<StubBackend>,
    Query(params): Query<ListParams>,
) -> Json<SessionList> {
    Json(stub.list(params.skip, params.limit))
}

pub async fn get_versions(
    State(stub): State<StubBackend>,
    Path(id): Path<String>,
) -> Result<Json<SessionHistory>, StubError> {
    stub.history(&id).map(Json)
}

pub async fn update_session(
    State(stub): State<StubBackend>,
    Path(id): Path<String>,
    Json(patch): Json<SessionPatch>,
) -> Result<Json<UpdatedSession>, StubError> {
    stub.update(&id, &patch).map(Json)
}

pub async fn delete_session(
    State(stub): State<StubBackend>,
    Path(id): Path<String>,
) -> Result<Json<DeletedSession>, StubError> {
    stub.delete(&id).map(Json)
}
