//! Error types shared across the client.

use std::fmt::{Display, Formatter};

/// Shared client result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Client error enumeration covering every failure a caller can observe.
///
/// Per-agent failures reported mid-run and `rejected` outcomes are not
/// errors: they are recorded in pipeline state as thoughts and as
/// [`PipelineOutcome::Rejected`](crate::pipeline::state::PipelineOutcome::Rejected).
#[derive(Debug)]
pub enum AppError {
    /// Precondition violated before any network call (empty idea, missing session).
    Validation(String),
    /// Non-success response status or network failure while streaming.
    Transport(String),
    /// A single protocol frame could not be decoded.
    Frame(String),
    /// The server reported a fatal pipeline failure.
    Pipeline(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or terminal I/O failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Frame(msg) => write!(f, "frame: {msg}"),
            Self::Pipeline(msg) => write!(f, "pipeline: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// The bare message without the `kind:` prefix.
    ///
    /// Used when a failure is surfaced to the user as a single string.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(msg)
            | Self::Transport(msg)
            | Self::Frame(msg)
            | Self::Pipeline(msg)
            | Self::Config(msg)
            | Self::Io(msg) => msg,
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Frame(format!("malformed json: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
