//! Client configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::stream::codec::MAX_LINE_BYTES;
use crate::{AppError, Result};

/// Keychain service name holding the API token.
pub const KEYRING_SERVICE: &str = "genstream";

/// Environment variable consulted when the keychain has no token.
pub const TOKEN_ENV_VAR: &str = "GENSTREAM_API_TOKEN";

/// Placeholder substituted with the session id in the answers path.
pub const SESSION_PLACEHOLDER: &str = "{session_id}";

/// Paths of the two streaming endpoints, relative to `base_url`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EndpointConfig {
    /// Phase 1: submit the raw idea.
    #[serde(default = "default_generate_path")]
    pub generate_path: String,
    /// Phase 2: submit answers; must contain `{session_id}`.
    #[serde(default = "default_answers_path")]
    pub answers_path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            generate_path: default_generate_path(),
            answers_path: default_answers_path(),
        }
    }
}

fn default_generate_path() -> String {
    "/api/v1/posts/generate/stream".into()
}

fn default_answers_path() -> String {
    format!("/api/v1/posts/{SESSION_PLACEHOLDER}/answers/stream")
}

/// Stream timing and framing limits.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StreamConfig {
    /// Seconds without any bytes before the stream is abandoned; 0 disables.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Longest accepted protocol line.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl StreamConfig {
    /// Idle timeout, or `None` when disabled.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_seconds > 0).then(|| Duration::from_secs(self.idle_timeout_seconds))
    }

    /// Connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

// The server pings every 60 s; three missed pings means the stream is dead.
fn default_idle_timeout() -> u64 {
    180
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_max_frame_bytes() -> usize {
    MAX_LINE_BYTES
}

fn default_session_header() -> String {
    "X-Post-ID".into()
}

/// Client configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Scheme, host and optional port of the pipeline server.
    pub base_url: String,
    /// Response header carrying the phase-1 session id.
    #[serde(default = "default_session_header")]
    pub session_header: String,
    /// Endpoint paths.
    #[serde(default)]
    pub endpoints: EndpointConfig,
    /// Stream limits.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Bearer token (populated at runtime, never read from the file).
    #[serde(skip)]
    pub api_token: Option<String>,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the server URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the URL fails validation.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let mut config = Self {
            base_url: base_url.into(),
            session_header: default_session_header(),
            endpoints: EndpointConfig::default(),
            stream: StreamConfig::default(),
            api_token: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the bearer token from OS keychain with env-var fallback.
    ///
    /// A missing token is not an error: requests are then sent without an
    /// `Authorization` header and the server decides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain lookup task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.api_token = load_credential("api_token", TOKEN_ENV_VAR).await?;
        if self.api_token.is_none() {
            warn!("no api token configured; requests will be unauthenticated");
        }
        Ok(())
    }

    /// Absolute URL of the phase-1 endpoint.
    #[must_use]
    pub fn generate_url(&self) -> String {
        join_url(&self.base_url, &self.endpoints.generate_path)
    }

    /// Absolute URL of the phase-2 endpoint for `session_id`.
    #[must_use]
    pub fn answers_url(&self, session_id: &str) -> String {
        let path = self
            .endpoints
            .answers_path
            .replace(SESSION_PLACEHOLDER, session_id);
        join_url(&self.base_url, &path)
    }

    fn validate(&mut self) -> Result<()> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(AppError::Config(
                "base_url must start with http:// or https://".into(),
            ));
        }
        self.base_url = trimmed.to_owned();

        if !self.endpoints.answers_path.contains(SESSION_PLACEHOLDER) {
            return Err(AppError::Config(format!(
                "endpoints.answers_path must contain {SESSION_PLACEHOLDER}"
            )));
        }

        if self.session_header.trim().is_empty() {
            return Err(AppError::Config("session_header must not be empty".into()));
        }

        if self.stream.max_frame_bytes == 0 {
            return Err(AppError::Config(
                "stream.max_frame_bytes must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).ok().filter(|value| !value.trim().is_empty()))
}
