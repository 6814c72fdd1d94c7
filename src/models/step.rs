//! Wizard step cursor.

use serde::{Deserialize, Serialize};

use super::agent::AgentName;

/// Wizard-facing position, ordered from first to last step.
///
/// Driven by pipeline events only; agent steps map 1:1 from [`AgentName`].
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Idea entry.
    #[default]
    Input,
    /// Validator running or reviewed.
    Validator,
    /// Strategist running or reviewed.
    Strategist,
    /// Waiting for answers to clarifying questions.
    Questions,
    /// Writer running.
    Writer,
    /// Visual agent running.
    Visual,
    /// Optimizer running.
    Optimizer,
    /// Final post ready for review.
    Review,
}

impl Step {
    /// Every step in wizard order.
    pub const ALL: [Self; 8] = [
        Self::Input,
        Self::Validator,
        Self::Strategist,
        Self::Questions,
        Self::Writer,
        Self::Visual,
        Self::Optimizer,
        Self::Review,
    ];

    /// Wire/display name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Validator => "validator",
            Self::Strategist => "strategist",
            Self::Questions => "questions",
            Self::Writer => "writer",
            Self::Visual => "visual",
            Self::Optimizer => "optimizer",
            Self::Review => "review",
        }
    }
}

impl From<AgentName> for Step {
    fn from(agent: AgentName) -> Self {
        match agent {
            AgentName::Validator => Self::Validator,
            AgentName::Strategist => Self::Strategist,
            AgentName::Writer => Self::Writer,
            AgentName::Visual => Self::Visual,
            AgentName::Optimizer => Self::Optimizer,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
