//! Handle and result of one streaming run.

use tokio::task::JoinHandle;
use tracing::warn;

use crate::models::question::ClarifyingQuestion;
use crate::pipeline::merge::FinalPost;
use crate::pipeline::state::{PipelineOutcome, PipelineState};
use crate::stream::transport::TransportHandle;

/// How one phase ended, from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Phase 1 finished; answer these questions and call
    /// [`submit_answers`](super::GenerationOrchestrator::submit_answers).
    AwaitingAnswers {
        /// Questions to answer.
        questions: Vec<ClarifyingQuestion>,
    },
    /// The idea was rejected; the cursor is back at input.
    Rejected {
        /// User-facing explanation.
        message: String,
    },
    /// The final post is ready.
    Completed(Box<FinalPost>),
    /// Transport or pipeline failure, collapsed to one message.
    Failed(String),
    /// The run was cancelled or superseded by a newer one.
    Cancelled,
}

impl RunOutcome {
    /// Derive the outcome from the state a run left behind.
    #[must_use]
    pub fn from_state(state: &PipelineState) -> Self {
        match &state.outcome {
            Some(PipelineOutcome::AwaitingAnswers) => Self::AwaitingAnswers {
                questions: state.questions.clone(),
            },
            Some(PipelineOutcome::Rejected { message }) => Self::Rejected {
                message: message.clone(),
            },
            Some(PipelineOutcome::Completed) => {
                Self::Completed(Box::new(state.final_post.clone().unwrap_or_default()))
            }
            Some(PipelineOutcome::Failed { message }) => Self::Failed(message.clone()),
            None => Self::Cancelled,
        }
    }
}

/// A run in flight.
///
/// Dropping the handle does not cancel the run; use [`cancel`](Self::cancel)
/// or the orchestrator's `cancel`.
#[derive(Debug)]
pub struct RunHandle {
    transport: TransportHandle,
    join: Option<JoinHandle<RunOutcome>>,
}

impl RunHandle {
    pub(crate) fn new(transport: TransportHandle, join: Option<JoinHandle<RunOutcome>>) -> Self {
        Self { transport, join }
    }

    /// Correlation id of the run.
    #[must_use]
    pub fn run_id(&self) -> &str {
        self.transport.run_id()
    }

    /// Stop this run; idempotent and silent.
    pub fn cancel(&self) {
        self.transport.cancel();
    }

    /// Wait for the read loop to finish.
    pub async fn wait(self) -> RunOutcome {
        let Some(join) = self.join else {
            return RunOutcome::Cancelled;
        };
        match join.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(run_id = self.transport.run_id(), %err, "run task failed");
                RunOutcome::Failed(format!("run task failed: {err}"))
            }
        }
    }
}
