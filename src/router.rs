//! Frame classification and dispatch.
//!
//! Each [`Frame`] is classified into one [`PipelineEvent`] variant and
//! handed to an [`EventHandler`] through [`dispatch`]. The router keeps no
//! buffer: events leave in exactly the order frames arrive.
//!
//! | `event_type`      | Maps to                                  |
//! |-------------------|------------------------------------------|
//! | `agent_start`     | [`PipelineEvent::AgentStarted`]          |
//! | `agent_complete`  | [`PipelineEvent::AgentCompleted`]        |
//! | `agent_error`     | [`PipelineEvent::AgentFailed`]           |
//! | `status_update`   | [`PipelineEvent::StatusUpdate`]          |
//! | `complete`        | [`PipelineEvent::PipelineCompleted`]     |
//! | keepalive ping    | Skipped; logged at `DEBUG`               |
//! | *(any other)*     | Skipped; logged at `WARN`                |

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::agent::AgentName;
use crate::stream::decoder::Frame;

/// A classified pipeline event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// An agent began executing.
    AgentStarted {
        /// Agent that started.
        agent: AgentName,
        /// Server narration.
        message: String,
        /// Overall pipeline progress, 0 to 100.
        progress: u8,
    },
    /// An agent finished and delivered its output.
    AgentCompleted {
        /// Agent that completed.
        agent: AgentName,
        /// Server narration.
        message: String,
        /// Execution duration.
        duration_ms: Option<u64>,
        /// `{summary, decision, score, output}` envelope or a bare output.
        payload: Value,
        /// Overall pipeline progress, 0 to 100.
        progress: u8,
    },
    /// An agent reported a failure; the server may retry it.
    AgentFailed {
        /// Agent that failed; `None` for `system` and unknown sources.
        agent: Option<AgentName>,
        /// Raw `agent_name` from the frame.
        source: String,
        /// Failure description.
        message: String,
        /// Server-side attempt number, when reported.
        attempt: Option<u32>,
    },
    /// Informational progress narration.
    StatusUpdate {
        /// Agent the update concerns, when it names one.
        agent: Option<AgentName>,
        /// Status text.
        message: String,
        /// Overall pipeline progress, 0 to 100.
        progress: u8,
    },
    /// The phase ended; `result.status` says how.
    PipelineCompleted {
        /// Server narration.
        message: String,
        /// Terminal payload.
        result: Value,
    },
}

/// Typed handlers for each event kind.
pub trait EventHandler {
    /// See [`PipelineEvent::AgentStarted`].
    fn on_agent_started(&mut self, agent: AgentName, message: &str, progress: u8);

    /// See [`PipelineEvent::AgentCompleted`].
    fn on_agent_completed(
        &mut self,
        agent: AgentName,
        message: &str,
        duration_ms: Option<u64>,
        payload: &Value,
        progress: u8,
    );

    /// See [`PipelineEvent::AgentFailed`].
    fn on_agent_failed(
        &mut self,
        agent: Option<AgentName>,
        source: &str,
        message: &str,
        attempt: Option<u32>,
    );

    /// See [`PipelineEvent::StatusUpdate`].
    fn on_status_update(&mut self, agent: Option<AgentName>, message: &str, progress: u8);

    /// See [`PipelineEvent::PipelineCompleted`].
    fn on_pipeline_completed(&mut self, message: &str, result: &Value);
}

/// Invoke the handler matching `event`.
pub fn dispatch<H>(handler: &mut H, event: &PipelineEvent)
where
    H: EventHandler + ?Sized,
{
    match event {
        PipelineEvent::AgentStarted {
            agent,
            message,
            progress,
        } => handler.on_agent_started(*agent, message, *progress),
        PipelineEvent::AgentCompleted {
            agent,
            message,
            duration_ms,
            payload,
            progress,
        } => handler.on_agent_completed(*agent, message, *duration_ms, payload, *progress),
        PipelineEvent::AgentFailed {
            agent,
            source,
            message,
            attempt,
        } => handler.on_agent_failed(*agent, source, message, *attempt),
        PipelineEvent::StatusUpdate {
            agent,
            message,
            progress,
        } => handler.on_status_update(*agent, message, *progress),
        PipelineEvent::PipelineCompleted { message, result } => {
            handler.on_pipeline_completed(message, result);
        }
    }
}

/// Classify a frame.
///
/// Returns `None` for keepalives, unknown kinds, and agent lifecycle events
/// that do not name one of the five agents.
#[must_use]
pub fn classify(frame: Frame) -> Option<PipelineEvent> {
    if frame.is_keepalive() {
        debug!("router: keepalive");
        return None;
    }

    let Some(kind) = frame.event_type.as_deref() else {
        warn!(kind = ?frame.kind, "router: frame without event_type, skipping");
        return None;
    };

    let source = frame.agent_name.clone().unwrap_or_default();
    let agent = AgentName::parse(&source);
    let message = frame.message.clone().unwrap_or_default();
    let progress = clamp_progress(frame.progress_percent);

    match kind {
        "agent_start" => {
            let Some(agent) = agent else {
                warn!(agent = %source, "router: agent_start for unknown agent, skipping");
                return None;
            };
            Some(PipelineEvent::AgentStarted {
                agent,
                message,
                progress,
            })
        }
        "agent_complete" => {
            let Some(agent) = agent else {
                warn!(agent = %source, "router: agent_complete for unknown agent, skipping");
                return None;
            };
            Some(PipelineEvent::AgentCompleted {
                agent,
                message,
                duration_ms: frame.execution_time_ms,
                payload: frame.data,
                progress,
            })
        }
        "agent_error" => {
            let attempt = frame
                .data
                .get("attempt")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok());
            // Prefer the bare error text over the decorated message.
            let message = frame
                .data
                .get("error")
                .and_then(Value::as_str)
                .map_or(message, str::to_owned);
            Some(PipelineEvent::AgentFailed {
                agent,
                source,
                message,
                attempt,
            })
        }
        "status_update" => Some(PipelineEvent::StatusUpdate {
            agent,
            message,
            progress,
        }),
        "complete" => Some(PipelineEvent::PipelineCompleted {
            message,
            result: frame.data,
        }),
        other => {
            warn!(kind = other, "router: unknown event kind, skipping");
            None
        }
    }
}

fn clamp_progress(raw: Option<i64>) -> u8 {
    u8::try_from(raw.unwrap_or(0).clamp(0, 100)).unwrap_or(100)
}
