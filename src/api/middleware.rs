//! Bearer-token check for the stub backend.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// Which key, if any, callers must present.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub api_key: Option<String>,
}

impl AuthConfig {
    /// Accept every request.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
        }
    }

    fn accepts(&self, header: Option<&str>) -> bool {
        let Some(ref expected) = self.api_key else {
            return true;
        };
        match header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) => token == expected.as_str(),
            None => false,
        }
    }
}

pub async fn auth_middleware(
    State(config): State<AuthConfig>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if config.accepts(header) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(present = header.is_some(), "rejected API key");
        Err(StatusCode::UNAUTHORIZED)
    }
}
