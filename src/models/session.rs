//! Generation session model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Requested post format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostFormat {
    /// Plain text post.
    #[default]
    Text,
    /// Multi-slide carousel; the only format the visual agent runs for.
    Carousel,
    /// Video script.
    Video,
    /// Let the strategist decide.
    Auto,
}

impl PostFormat {
    /// Wire name of the format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Carousel => "carousel",
            Self::Video => "video",
            Self::Auto => "auto",
        }
    }

    /// Parse a wire or user-supplied format name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for unknown names.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "carousel" => Ok(Self::Carousel),
            "video" => Ok(Self::Video),
            "auto" | "" => Ok(Self::Auto),
            other => Err(AppError::Validation(format!("unknown post format: {other}"))),
        }
    }
}

/// Which of the two streaming exchanges a session is in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Idea submitted; validator and strategist run.
    IdeaSubmission,
    /// Answers submitted; writer, visual and optimizer run.
    AnswerSubmission,
}

/// Identity and inputs of one generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationSession {
    /// Server-issued identifier; known once phase 1 has responded.
    pub session_id: Option<String>,
    /// Current phase.
    pub phase: Phase,
    /// Idea text as submitted.
    pub raw_idea: String,
    /// Format the user asked for.
    pub preferred_format: PostFormat,
    /// When the session was started.
    pub created_at: DateTime<Utc>,
}

impl GenerationSession {
    /// Start a phase-1 session with no server identifier yet.
    #[must_use]
    pub fn new(raw_idea: String, preferred_format: PostFormat) -> Self {
        Self {
            session_id: None,
            phase: Phase::IdeaSubmission,
            raw_idea,
            preferred_format,
            created_at: Utc::now(),
        }
    }
}
