//! Runtime configuration.
//!
//! Loaded from environment variables:
//! - `PRISM_API_URL` - Backend root URL (default: `http://localhost:8000`)
//! - `PRISM_API_KEY` - Bearer token, optional for local backends
//! - `PRISM_TIMEOUT_SECS` - Timeout for generation calls (default: 180)
//! - `PRISM_REQUEST_TIMEOUT_SECS` - Timeout for every other call (default: 30)
//! - `PRISM_DB_PATH` - SQLite file holding the session pointer
//!   (default: platform data directory)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default backend for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Image synthesis can take minutes.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(180);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Applies to generate, feedback and rollback.
    pub generation_timeout: Duration,
    pub request_timeout: Duration,
    /// `None` means the platform default, see [`crate::db::Database::open_default`].
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            db_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_url = std::env::var("PRISM_API_URL").unwrap_or(defaults.api_url);
        let api_key = std::env::var("PRISM_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());
        let generation_timeout =
            secs_var("PRISM_TIMEOUT_SECS")?.unwrap_or(defaults.generation_timeout);
        let request_timeout =
            secs_var("PRISM_REQUEST_TIMEOUT_SECS")?.unwrap_or(defaults.request_timeout);
        let db_path = std::env::var("PRISM_DB_PATH").ok().map(PathBuf::from);

        Ok(Self {
            api_url,
            api_key,
            generation_timeout,
            request_timeout,
            db_path,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }
}

fn secs_var(name: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_allow_long_generation() {
        let config = Config::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.generation_timeout >= Duration::from_secs(60));
        assert!(config.request_timeout < config.generation_timeout);
    }

    #[test]
    fn test_builders_override_fields() {
        let config = Config::default()
            .with_api_url("http://127.0.0.1:9000")
            .with_db_path("/tmp/prism.db");
        assert_eq!(config.api_url, "http://127.0.0.1:9000");
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/prism.db")));
    }
}
