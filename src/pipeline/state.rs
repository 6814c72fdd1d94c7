//! Pipeline state machine.
//!
//! [`PipelineState`] mirrors one generation session: identity, the five
//! agent executions, the step cursor and accumulated outputs. It is mutated
//! only through [`EventHandler`] callbacks (driven by the stream) and a
//! handful of session-level operations invoked by the orchestrator.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::agent::{AgentExecution, AgentName, AgentStatus, ThoughtKind};
use crate::models::outputs::{
    AgentOutputs, OptimizerOutput, StrategistOutput, ValidatorOutput, VisualOutput, WriterOutput,
};
use crate::models::question::{fallback_questions, questions_from_value, ClarifyingQuestion};
use crate::models::session::{GenerationSession, Phase, PostFormat};
use crate::models::step::Step;
use crate::pipeline::merge::{assemble, FinalPost};
use crate::pipeline::summary::summarize;
use crate::router::EventHandler;

/// Message surfaced when a stream closes without a terminal frame.
pub const ENDED_EARLY: &str = "stream ended before the pipeline completed";

/// Terminal result of one phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PipelineOutcome {
    /// Phase 1 finished; answers are needed to continue.
    AwaitingAnswers,
    /// The idea was rejected. A valid business result, not a failure.
    Rejected {
        /// User-facing explanation.
        message: String,
    },
    /// Phase 2 finished; the final post is ready.
    Completed,
    /// The pipeline failed fatally.
    Failed {
        /// Server or transport message.
        message: String,
    },
}

/// Observable state of one generation session.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PipelineState {
    /// Current session, if one has been started.
    pub session: Option<GenerationSession>,
    /// One execution per agent, indexed by [`AgentName::index`].
    pub agents: [AgentExecution; 5],
    /// Wizard cursor.
    pub step: Step,
    /// Latest output of each agent.
    pub outputs: AgentOutputs,
    /// Clarifying questions to answer before phase 2.
    pub questions: Vec<ClarifyingQuestion>,
    /// Assembled post once phase 2 completes.
    pub final_post: Option<FinalPost>,
    /// Overall progress reported by the server, 0 to 100.
    pub progress: u8,
    /// Latest status narration.
    pub status_message: Option<String>,
    /// User-facing domain message (e.g. why an idea was rejected).
    pub user_message: Option<String>,
    /// Surfaced fatal error.
    pub error: Option<String>,
    /// How the current phase ended, once it has.
    pub outcome: Option<PipelineOutcome>,
    /// Whether a stream is currently being consumed.
    pub generating: bool,
    /// Last failure reported by the `system` pseudo-agent in this phase.
    #[serde(skip)]
    system_error: Option<String>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    /// An empty state with no session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            agents: AgentName::ALL.map(AgentExecution::new),
            step: Step::Input,
            outputs: AgentOutputs::default(),
            questions: Vec::new(),
            final_post: None,
            progress: 0,
            status_message: None,
            user_message: None,
            error: None,
            outcome: None,
            generating: false,
            system_error: None,
        }
    }

    /// Discard everything and start a phase-1 session.
    pub fn begin_session(&mut self, raw_idea: String, preferred_format: PostFormat) {
        *self = Self::new();
        self.session = Some(GenerationSession::new(raw_idea, preferred_format));
    }

    /// Move the session to phase 2.
    ///
    /// Pre-marks the visual agent skipped when the post is not a carousel:
    /// the server never emits start/complete for a step it does not run.
    pub fn begin_answers(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.phase = Phase::AnswerSubmission;
        }
        self.outcome = None;
        self.error = None;
        self.user_message = None;
        self.system_error = None;
        self.final_post = None;

        if self.effective_format() != PostFormat::Carousel {
            let visual = self.agent_mut(AgentName::Visual);
            visual.status = AgentStatus::Skipped;
            visual.progress = 0;
            self.outputs.visual = None;
        }
    }

    /// Record the server-issued session id.
    pub fn set_session_id(&mut self, session_id: String) {
        if let Some(session) = self.session.as_mut() {
            session.session_id = Some(session_id);
        }
    }

    /// Server-issued session id, once known.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref()?.session_id.as_deref()
    }

    /// Format the server will produce: the strategist's recommendation, else
    /// the user's preference unless it is `auto`, else text.
    #[must_use]
    pub fn effective_format(&self) -> PostFormat {
        if let Some(format) = self.outputs.strategist.as_ref().and_then(StrategistOutput::format) {
            return format;
        }
        match self.session.as_ref().map(|s| s.preferred_format) {
            Some(PostFormat::Auto) | None => PostFormat::Text,
            Some(format) => format,
        }
    }

    /// Execution of `agent`.
    #[must_use]
    pub fn agent(&self, agent: AgentName) -> &AgentExecution {
        &self.agents[agent.index()]
    }

    fn agent_mut(&mut self, agent: AgentName) -> &mut AgentExecution {
        &mut self.agents[agent.index()]
    }

    /// The agent currently executing, if any.
    #[must_use]
    pub fn active_agent(&self) -> Option<AgentName> {
        self.agents.iter().find(|a| a.is_active()).map(|a| a.agent)
    }

    /// Surface a fatal failure: set the error, mark the active agent failed,
    /// leave the cursor where it is.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.outcome.is_some() {
            debug!(error = %message, "phase already ended, ignoring failure");
            return;
        }
        warn!(error = %message, step = %self.step, "pipeline failed");
        if let Some(active) = self.active_agent() {
            let execution = self.agent_mut(active);
            execution.status = AgentStatus::Error;
            execution.push_thought(ThoughtKind::Error, message.clone());
        }
        self.error = Some(message.clone());
        self.outcome = Some(PipelineOutcome::Failed { message });
    }

    /// Handle a stream that closed without a terminal frame.
    ///
    /// Uses the last `system` failure as the message when there was one.
    pub fn finish_without_result(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        let message = self
            .system_error
            .take()
            .unwrap_or_else(|| ENDED_EARLY.to_owned());
        self.fail(message);
    }

    fn store_output(&mut self, agent: AgentName, payload: &Value) {
        // `{summary, decision, score, output}` envelope, or a bare output.
        let output = payload
            .get("output")
            .filter(|v| v.is_object())
            .unwrap_or(payload);
        let envelope_score = payload.get("score").and_then(Value::as_f64);

        match agent {
            AgentName::Validator => {
                let mut out: ValidatorOutput = parse_output(agent, output);
                out.quality_score = out.quality_score.or(envelope_score);
                self.outputs.validator = Some(out);
            }
            AgentName::Strategist => {
                let out: StrategistOutput = parse_output(agent, output);
                if !out.clarifying_questions.is_empty() {
                    self.questions.clone_from(&out.clarifying_questions);
                }
                self.outputs.strategist = Some(out);
            }
            AgentName::Writer => {
                self.outputs.writer = Some(parse_output(agent, output));
            }
            AgentName::Visual => {
                self.outputs.visual = Some(VisualOutput::from_value(output).unwrap_or_default());
            }
            AgentName::Optimizer => {
                let mut out: OptimizerOutput = parse_output(agent, output);
                out.quality_score = out.quality_score.or(envelope_score);
                self.outputs.optimizer = Some(out);
            }
        }
    }

    fn complete_awaiting_answers(&mut self, result: &Value) {
        let strategist_has_questions = self
            .outputs
            .strategist
            .as_ref()
            .is_some_and(|s| !s.clarifying_questions.is_empty());

        if !strategist_has_questions {
            let mut questions = questions_from_value(result.get("questions").unwrap_or(&Value::Null));
            if questions.is_empty() {
                warn!("awaiting answers without any questions; using fallback set");
                questions = fallback_questions();
            }
            self.questions = questions;
        }

        self.step = Step::Questions;
        self.outcome = Some(PipelineOutcome::AwaitingAnswers);
        info!(questions = self.questions.len(), "pipeline awaiting answers");
    }

    fn complete_rejected(&mut self, message: &str, result: &Value) {
        if let Some(validator) = result.get("validator_output").filter(|v| v.is_object()) {
            self.outputs.validator = Some(parse_output(AgentName::Validator, validator));
        }

        let reasoning = self
            .outputs
            .validator
            .as_ref()
            .map(|v| v.reasoning.trim())
            .filter(|r| !r.is_empty());
        let user_message = match reasoning {
            Some(reasoning) => format!("Your idea was not approved: {reasoning}"),
            None if !message.trim().is_empty() => message.trim().to_owned(),
            None => "Your idea was not approved. Refine it and try again.".to_owned(),
        };

        info!(message = %user_message, "pipeline rejected idea");
        self.step = Step::Input;
        self.user_message = Some(user_message.clone());
        self.outcome = Some(PipelineOutcome::Rejected {
            message: user_message,
        });
    }

    fn complete_post(&mut self, result: &Value) {
        if let Some(optimizer) = result.get("optimizer_output").filter(|v| v.is_object()) {
            self.outputs.optimizer = Some(parse_output(AgentName::Optimizer, optimizer));
        }

        let post = assemble(result, &self.outputs, self.effective_format());
        info!(format = post.format.as_str(), "pipeline completed");
        self.final_post = Some(post);
        self.step = Step::Review;
        self.progress = 100;
        self.outcome = Some(PipelineOutcome::Completed);
    }
}

impl EventHandler for PipelineState {
    fn on_agent_started(&mut self, agent: AgentName, message: &str, progress: u8) {
        if let Some(previous) = self.active_agent().filter(|a| *a != agent) {
            warn!(%previous, %agent, "agent started while another was active");
            let execution = self.agent_mut(previous);
            execution.status = AgentStatus::Error;
            execution.push_thought(ThoughtKind::Error, "superseded before completing");
        }

        let execution = self.agent_mut(agent);
        execution.status = AgentStatus::Active;
        execution.progress = 0;
        execution.thoughts.clear();
        execution.duration_ms = None;
        execution.started_at = Some(Utc::now());
        if !message.trim().is_empty() {
            execution.push_thought(ThoughtKind::Info, message);
        }

        self.step = Step::from(agent);
        self.progress = progress;
        debug!(%agent, "agent started");
    }

    fn on_agent_completed(
        &mut self,
        agent: AgentName,
        _message: &str,
        duration_ms: Option<u64>,
        payload: &Value,
        progress: u8,
    ) {
        self.store_output(agent, payload);

        let summary = payload
            .get("summary")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned)
            .or_else(|| summarize(&self.outputs, agent));

        let execution = self.agent_mut(agent);
        execution.status = AgentStatus::Success;
        execution.progress = 100;
        execution.duration_ms = duration_ms;
        if let Some(summary) = summary {
            execution.push_thought(ThoughtKind::Summary, summary);
        }

        self.progress = self.progress.max(progress);
        debug!(%agent, ?duration_ms, "agent completed");
    }

    fn on_agent_failed(
        &mut self,
        agent: Option<AgentName>,
        source: &str,
        message: &str,
        attempt: Option<u32>,
    ) {
        let text = match attempt {
            Some(attempt) => format!("attempt {attempt} failed: {message}"),
            None => format!("failed: {message}"),
        };

        match agent {
            Some(agent) => {
                warn!(%agent, ?attempt, error = message, "agent reported failure");
                self.agent_mut(agent).push_thought(ThoughtKind::Error, text);
            }
            None => {
                warn!(source, error = message, "pipeline reported failure");
                self.system_error = Some(message.to_owned());
            }
        }
    }

    fn on_status_update(&mut self, _agent: Option<AgentName>, message: &str, progress: u8) {
        self.status_message = Some(message.to_owned());
        if progress > 0 {
            self.progress = progress;
        }
    }

    fn on_pipeline_completed(&mut self, message: &str, result: &Value) {
        if self.session_id().is_none() {
            if let Some(post_id) = result.get("post_id").and_then(Value::as_str) {
                self.set_session_id(post_id.to_owned());
            }
        }

        let status = result.get("status").and_then(Value::as_str);
        let has_post = ["final_post", "final_output"]
            .iter()
            .any(|key| result.get(*key).is_some_and(Value::is_object));

        match status {
            Some("awaiting_answers") => self.complete_awaiting_answers(result),
            Some("rejected") => self.complete_rejected(message, result),
            Some("completed") => self.complete_post(result),
            None if has_post => self.complete_post(result),
            Some("failed") => {
                let detail = result
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(message);
                let detail = if detail.trim().is_empty() {
                    "pipeline failed"
                } else {
                    detail
                };
                self.fail(detail);
            }
            other => {
                warn!(status = ?other, "terminal frame with unknown status, ignoring");
            }
        }
    }
}

fn parse_output<T>(agent: AgentName, value: &Value) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    serde_json::from_value(value.clone()).unwrap_or_else(|err| {
        warn!(%agent, error = %err, "agent output did not match its schema");
        T::default()
    })
}
