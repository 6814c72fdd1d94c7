//! Per-agent execution model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One named stage of the server-side pipeline, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    /// Scores the raw idea and decides whether to continue.
    Validator,
    /// Picks format and structure; asks clarifying questions.
    Strategist,
    /// Drafts hooks, body, call-to-action and hashtags.
    Writer,
    /// Produces slide specs; only runs for carousel posts.
    Visual,
    /// Reviews the draft and predicts engagement.
    Optimizer,
}

impl AgentName {
    /// Every agent in server execution order.
    pub const ALL: [Self; 5] = [
        Self::Validator,
        Self::Strategist,
        Self::Writer,
        Self::Visual,
        Self::Optimizer,
    ];

    /// Wire name of the agent.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validator => "validator",
            Self::Strategist => "strategist",
            Self::Writer => "writer",
            Self::Visual => "visual",
            Self::Optimizer => "optimizer",
        }
    }

    /// Resolve a wire name; `None` for anything outside the five agents
    /// (including the server's `system` pseudo-agent).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "validator" => Some(Self::Validator),
            "strategist" => Some(Self::Strategist),
            "writer" => Some(Self::Writer),
            "visual" => Some(Self::Visual),
            "optimizer" => Some(Self::Optimizer),
            _ => None,
        }
    }

    /// Position in [`Self::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-visible execution status of one agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Not started in the current session.
    #[default]
    Pending,
    /// Currently executing on the server.
    Active,
    /// Completed and delivered its output.
    Success,
    /// Left unfinished by a fatal pipeline failure.
    Error,
    /// Will never run for this session (e.g. visual on non-carousel posts).
    Skipped,
}

/// Classification of a thought line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtKind {
    /// Progress narration from the server.
    Info,
    /// Summary synthesized from a completed agent's output.
    Summary,
    /// A recoverable failure report; the server may retry.
    Error,
}

/// A short human-readable log line emitted during an agent's run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thought {
    /// Line classification.
    pub kind: ThoughtKind,
    /// Display text.
    pub text: String,
    /// When the client recorded the line.
    pub at: DateTime<Utc>,
}

impl Thought {
    /// Construct a thought stamped with the current time.
    #[must_use]
    pub fn new(kind: ThoughtKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Mirror of one agent's server-side execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentExecution {
    /// Which agent this execution belongs to.
    pub agent: AgentName,
    /// Current status.
    pub status: AgentStatus,
    /// Progress in percent, 0 to 100.
    pub progress: u8,
    /// Append-only log; cleared only when the agent starts a new run.
    pub thoughts: Vec<Thought>,
    /// Server-reported execution duration.
    pub duration_ms: Option<u64>,
    /// When the client saw the agent start.
    pub started_at: Option<DateTime<Utc>>,
}

impl AgentExecution {
    /// A pending execution with an empty log.
    #[must_use]
    pub fn new(agent: AgentName) -> Self {
        Self {
            agent,
            status: AgentStatus::Pending,
            progress: 0,
            thoughts: Vec::new(),
            duration_ms: None,
            started_at: None,
        }
    }

    /// Append a thought to the log.
    pub fn push_thought(&mut self, kind: ThoughtKind, text: impl Into<String>) {
        self.thoughts.push(Thought::new(kind, text));
    }

    /// Whether the agent is currently executing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}
