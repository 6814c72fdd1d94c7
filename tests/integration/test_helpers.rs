//! Shared helpers for integration tests.
//!
//! Provides a scripted in-memory [`StreamTransport`], SSE frame builders and
//! state-wait utilities.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use genstream::config::StreamConfig;
use genstream::pipeline::state::PipelineState;
use genstream::stream::transport::{ByteStream, OpenedStream, StreamRequest, StreamTransport};
use genstream::{AppError, GenerationOrchestrator, Result};

/// Upper bound on any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// One SSE record carrying `frame`.
pub fn sse(event: &str, frame: &Value) -> String {
    format!("event: {event}\ndata: {frame}\n\n")
}

pub fn agent_start(agent: &str) -> String {
    sse(
        "agent_start",
        &json!({"event_type": "agent_start", "agent_name": agent, "message": format!("{agent} started")}),
    )
}

pub fn agent_complete(agent: &str, data: &Value) -> String {
    sse(
        "agent_complete",
        &json!({"event_type": "agent_complete", "agent_name": agent, "execution_time_ms": 250, "data": data}),
    )
}

pub fn terminal(data: &Value) -> String {
    sse(
        "complete",
        &json!({"event_type": "complete", "agent_name": "system", "message": "done", "data": data}),
    )
}

pub fn keepalive() -> String {
    sse("ping", &json!({"type": "keepalive"}))
}

/// A full phase-1 stream ending in `awaiting_answers`.
pub fn phase_one_stream(post_id: &str) -> Vec<String> {
    vec![
        agent_start("validator"),
        agent_complete("validator", &json!({"decision": "APPROVE", "score": 8.5})),
        keepalive(),
        agent_start("strategist"),
        agent_complete(
            "strategist",
            &json!({"output": {
                "recommended_format": "text",
                "structure_type": "story_post",
                "clarifying_questions": [
                    {"question_id": "q_story", "question": "What happened?"},
                    {"question_id": "q_lesson", "question": "What did you learn?"}
                ]
            }}),
        ),
        terminal(&json!({"status": "awaiting_answers", "post_id": post_id})),
    ]
}

/// A full phase-2 stream ending in `completed`.
pub fn phase_two_stream(post_id: &str) -> Vec<String> {
    vec![
        agent_start("writer"),
        agent_complete(
            "writer",
            &json!({"output": {
                "hooks": [{"version": 1, "text": "I almost quit.", "score": 8.8}],
                "body_content": "Then I changed one habit.",
                "cta": "What habit changed your work?",
                "hashtags": ["career"]
            }}),
        ),
        agent_start("optimizer"),
        agent_complete(
            "optimizer",
            &json!({"output": {"decision": "APPROVE", "quality_score": 8.9}}),
        ),
        terminal(&json!({
            "status": "completed",
            "post_id": post_id,
            "final_post": {"format": "text", "quality_score": 8.9, "predicted_impressions": [1000, 3000]}
        })),
    ]
}

/// Counts body streams dropped by the reader.
struct CloseGuard(Arc<AtomicUsize>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn guarded(body: ByteStream, closed: &Arc<AtomicUsize>) -> ByteStream {
    let guard = CloseGuard(Arc::clone(closed));
    stream::unfold((body, guard), |(mut body, guard)| async move {
        let item = body.next().await?;
        Some((item, (body, guard)))
    })
    .boxed()
}

/// Sender side of a body that stays open until dropped.
pub type BodySender = mpsc::UnboundedSender<Result<Bytes>>;

fn channel_body() -> (BodySender, ByteStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let body = stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((item, rx))
    })
    .boxed();
    (tx, body)
}

enum Script {
    Open {
        session_id: Option<String>,
        body: ByteStream,
    },
    Fail(AppError),
}

/// In-memory transport replaying scripted responses in order.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<StreamRequest>>,
    opens: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a body that closes after `chunks`.
    pub fn push_chunks(&self, session_id: Option<&str>, chunks: Vec<String>) {
        let body = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed();
        self.push(Script::Open {
            session_id: session_id.map(str::to_owned),
            body,
        });
    }

    /// Queue a body fed by the returned sender; it closes when the sender drops.
    pub fn push_channel(&self, session_id: Option<&str>) -> BodySender {
        let (tx, body) = channel_body();
        self.push(Script::Open {
            session_id: session_id.map(str::to_owned),
            body,
        });
        tx
    }

    /// Queue an open failure.
    pub fn push_failure(&self, err: AppError) {
        self.push(Script::Fail(err));
    }

    fn push(&self, script: Script) {
        self.scripts.lock().expect("scripts lock").push_back(script);
    }

    /// Number of `open` calls so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of bodies released by the reader.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl StreamTransport for ScriptedTransport {
    fn open(
        &self,
        request: StreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<OpenedStream>> + Send + '_>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(request);
        let script = self.scripts.lock().expect("scripts lock").pop_front();
        Box::pin(async move {
            match script {
                Some(Script::Open { session_id, body }) => Ok(OpenedStream {
                    session_id,
                    body: guarded(body, &self.closed),
                }),
                Some(Script::Fail(err)) => Err(err),
                None => Err(AppError::Transport("no scripted response".into())),
            }
        })
    }
}

/// Orchestrator over `transport` with the given idle timeout (0 disables).
pub fn orchestrator(transport: &Arc<ScriptedTransport>, idle_seconds: u64) -> GenerationOrchestrator {
    let stream = StreamConfig {
        idle_timeout_seconds: idle_seconds,
        ..StreamConfig::default()
    };
    let transport: Arc<dyn StreamTransport> = Arc::clone(transport) as Arc<dyn StreamTransport>;
    GenerationOrchestrator::new(transport, &stream)
}

/// Wait until `predicate` holds for the published state.
pub async fn wait_for_state<F>(rx: &mut watch::Receiver<PipelineState>, predicate: F) -> PipelineState
where
    F: FnMut(&PipelineState) -> bool,
{
    tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("state condition reached in time")
        .expect("state channel open")
        .clone()
}
