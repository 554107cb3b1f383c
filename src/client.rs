//! HTTP client for the PRISM generation backend.
//!
//! The store only sees the [`PrismBackend`] trait, so the same code runs
//! against the real service, the in-process stub in [`crate::api`], or a test
//! double. [`PrismClient`] is the HTTP implementation.
//!
//! Generation-class calls (generate, feedback, rollback) wait up to
//! [`Config::generation_timeout`]; everything else uses the shorter
//! [`Config::request_timeout`]. Nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::Config;
use crate::models::*;

/// Prefix of every resource route. Health sits at the root.
const API_PREFIX: &str = "/api/v1";

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: API key required or invalid")]
    Unauthorized,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl ClientError {
    /// The human-readable message the backend attached to a failure, if any.
    pub fn remote_message(&self) -> Option<&str> {
        let message = match self {
            Self::NotFound(msg) | Self::BadRequest(msg) => msg,
            Self::Server { message, .. } => message,
            Self::Http(_) | Self::Unauthorized => return None,
        };
        let message = message.trim();
        (!message.is_empty()).then_some(message)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }
}

/// Operations offered by the generation backend.
#[async_trait]
pub trait PrismBackend: Send + Sync {
    /// Compile a prompt without creating a version.
    async fn preview(&self, request: &PreviewRequest) -> Result<PreviewResponse, ClientError>;

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ClientError>;

    async fn feedback(&self, request: &FeedbackRequest) -> Result<FeedbackResponse, ClientError>;

    async fn rollback(
        &self,
        session_id: &str,
        request: &RollbackRequest,
    ) -> Result<FeedbackResponse, ClientError>;

    async fn get_versions(&self, session_id: &str) -> Result<SessionHistory, ClientError>;

    async fn list_sessions(&self, offset: u32, limit: u32) -> Result<SessionList, ClientError>;

    async fn update_session(
        &self,
        session_id: &str,
        patch: &SessionPatch,
    ) -> Result<UpdatedSession, ClientError>;

    async fn delete_session(&self, session_id: &str) -> Result<DeletedSession, ClientError>;

    async fn health(&self) -> Result<HealthStatus, ClientError>;
}

/// HTTP client for the PRISM backend.
#[derive(Debug, Clone)]
pub struct PrismClient {
    base_url: String,
    api_key: Option<String>,
    generation_timeout: Duration,
    request_timeout: Duration,
    client: Client,
}

impl PrismClient {
    /// Create client from environment variables.
    pub fn from_env() -> Result<Self, crate::config::ConfigError> {
        Ok(Self::from_config(&Config::from_env()?))
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            generation_timeout: config.generation_timeout,
            request_timeout: config.request_timeout,
            client: Client::new(),
        }
    }

    /// Create with an explicit base URL and default timeouts.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let config = Config {
            api_url: base_url.into(),
            api_key,
            ..Config::default()
        };
        Self::from_config(&config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with optional auth header and the given timeout.
    fn request(&self, method: Method, path: &str, timeout: Duration) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "backend request");
        let mut req = self.client.request(method, &url).timeout(timeout);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    fn api(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.request(method, &format!("{}{}", API_PREFIX, path), self.request_timeout)
    }

    fn generation(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(
            Method::POST,
            &format!("{}{}", API_PREFIX, path),
            self.generation_timeout,
        )
    }

    /// Handle response, converting HTTP errors to ClientError.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            let message = extract_message(&body);
            tracing::debug!(%status, %message, "backend error response");
            match status {
                StatusCode::NOT_FOUND => Err(ClientError::NotFound(message)),
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                    Err(ClientError::BadRequest(message))
                }
                StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
                _ => Err(ClientError::Server {
                    status: status.as_u16(),
                    message,
                }),
            }
        }
    }
}

/// Pull a readable message out of an error body.
///
/// The backend reports failures as `{"detail": "..."}`; some proxies use
/// `{"message": "..."}`. Non-JSON bodies are passed through as text.
fn extract_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => ["message", "detail"]
            .iter()
            .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl PrismBackend for PrismClient {
    async fn preview(&self, request: &PreviewRequest) -> Result<PreviewResponse, ClientError> {
        let response = self
            .api(Method::POST, "/preview")
            .json(request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ClientError> {
        let response = self.generation("/generate").json(request).send().await?;
        self.handle_response(response).await
    }

    async fn feedback(&self, request: &FeedbackRequest) -> Result<FeedbackResponse, ClientError> {
        let response = self
            .generation(&format!("/sessions/{}/feedback", request.session_id))
            .json(request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn rollback(
        &self,
        session_id: &str,
        request: &RollbackRequest,
    ) -> Result<FeedbackResponse, ClientError> {
        let response = self
            .generation(&format!("/sessions/{}/rollback", session_id))
            .json(request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn get_versions(&self, session_id: &str) -> Result<SessionHistory, ClientError> {
        let response = self
            .api(Method::GET, &format!("/sessions/{}/versions", session_id))
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn list_sessions(&self, offset: u32, limit: u32) -> Result<SessionList, ClientError> {
        let response = self
            .api(Method::GET, "/sessions")
            .query(&[("skip", offset), ("limit", limit)])
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn update_session(
        &self,
        session_id: &str,
        patch: &SessionPatch,
    ) -> Result<UpdatedSession, ClientError> {
        let response = self
            .api(Method::PATCH, &format!("/sessions/{}", session_id))
            .json(patch)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<DeletedSession, ClientError> {
        let response = self
            .api(Method::DELETE, &format!("/sessions/{}", session_id))
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        let response = self
            .request(Method::GET, "/health", self.request_timeout)
            .send()
            .await?;
        self.handle_response(response).await
    }
}
