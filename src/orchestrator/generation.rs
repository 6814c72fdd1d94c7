//! Generation orchestrator facade.
//!
//! Composes transport, decoder, router and state machine behind four
//! operations: [`start_generation`](GenerationOrchestrator::start_generation),
//! [`submit_answers`](GenerationOrchestrator::submit_answers),
//! [`cancel`](GenerationOrchestrator::cancel) and
//! [`reset`](GenerationOrchestrator::reset).
//!
//! # Concurrency
//!
//! One stream is consumed at a time. The state lives inside a
//! [`watch`] channel so every transition is serialized with readers and
//! published to subscribers. Each run is tagged with the epoch current when
//! it was launched; `cancel`, `reset` and new runs advance the epoch, and a
//! transition is applied only while its run's epoch is still current. Late
//! frames from a superseded stream are therefore dropped.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{ClientConfig, StreamConfig};
use crate::models::question::QuestionAnswers;
use crate::models::session::PostFormat;
use crate::orchestrator::run::{RunHandle, RunOutcome};
use crate::pipeline::state::PipelineState;
use crate::router::{classify, dispatch, PipelineEvent};
use crate::stream::decoder::FrameDecoder;
use crate::stream::reader::{read_frames, ReadOutcome};
use crate::stream::transport::{
    EndpointKind, HttpTransport, StaticCredential, StreamRequest, StreamTransport, TransportHandle,
};
use crate::{AppError, Result};

/// State shared between the facade and spawned read loops.
struct Shared {
    state: watch::Sender<PipelineState>,
    epoch: AtomicU64,
    active: Mutex<Option<TransportHandle>>,
}

impl Shared {
    /// Apply `f` if `epoch` is still current; returns whether it ran.
    fn apply<F>(&self, epoch: u64, f: F) -> bool
    where
        F: FnOnce(&mut PipelineState),
    {
        self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            f(state);
            true
        })
    }

    /// Advance the epoch and apply `f` atomically; returns the new epoch.
    fn advance<F>(&self, f: F) -> u64
    where
        F: FnOnce(&mut PipelineState),
    {
        let mut next = 0;
        self.state.send_modify(|state| {
            next = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            f(state);
        });
        next
    }
}

/// Client-side driver of the two-phase generation pipeline.
pub struct GenerationOrchestrator {
    transport: Arc<dyn StreamTransport>,
    shared: Arc<Shared>,
    idle_timeout: Option<Duration>,
    max_frame_bytes: usize,
}

impl GenerationOrchestrator {
    /// Build an orchestrator over any transport.
    #[must_use]
    pub fn new(transport: Arc<dyn StreamTransport>, stream: &StreamConfig) -> Self {
        let (state, _) = watch::channel(PipelineState::new());
        Self {
            transport,
            shared: Arc::new(Shared {
                state,
                epoch: AtomicU64::new(0),
                active: Mutex::new(None),
            }),
            idle_timeout: stream.idle_timeout(),
            max_frame_bytes: stream.max_frame_bytes,
        }
    }

    /// Build an orchestrator with the HTTP transport described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the HTTP client cannot be built.
    pub fn from_config(config: Arc<ClientConfig>) -> Result<Self> {
        let credentials = Arc::new(StaticCredential::new(config.api_token.clone()));
        let transport = HttpTransport::new(Arc::clone(&config), credentials)?;
        Ok(Self::new(Arc::new(transport), &config.stream))
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.shared.state.subscribe()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> PipelineState {
        self.shared.state.borrow().clone()
    }

    /// Whether a stream is being consumed.
    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.shared.state.borrow().generating
    }

    /// Server-issued session id, once phase 1 has provided one.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.shared.state.borrow().session_id().map(str::to_owned)
    }

    /// Phase 1: submit an idea and start streaming.
    ///
    /// Cancels any active run and discards all prior state first. Returns
    /// once the server has accepted the request; the stream is consumed in
    /// the background.
    ///
    /// # Errors
    ///
    /// - `AppError::Validation` if `raw_idea` is blank; no request is sent.
    /// - `AppError::Transport` if the server rejects the request or is
    ///   unreachable.
    pub async fn start_generation(
        &self,
        raw_idea: &str,
        preferred_format: PostFormat,
    ) -> Result<RunHandle> {
        if raw_idea.trim().is_empty() {
            return Err(AppError::Validation("idea must not be empty".into()));
        }

        self.cancel_active().await;
        let idea = raw_idea.to_owned();
        let epoch = self.shared.advance(|state| {
            state.begin_session(idea, preferred_format);
        });

        let request = StreamRequest {
            endpoint: EndpointKind::SubmitIdea,
            payload: json!({
                "raw_idea": raw_idea,
                "preferred_format": preferred_format.as_str(),
            }),
        };
        self.launch(epoch, request).await
    }

    /// Phase 2: submit answers for the current session and stream the rest.
    ///
    /// # Errors
    ///
    /// - `AppError::Validation` if phase 1 has not produced a session id;
    ///   no request is sent.
    /// - `AppError::Transport` if the server rejects the request or is
    ///   unreachable.
    pub async fn submit_answers(&self, answers: &QuestionAnswers) -> Result<RunHandle> {
        let Some(session_id) = self.session_id() else {
            return Err(AppError::Validation(
                "no session: submit an idea before answering questions".into(),
            ));
        };

        let missing: Vec<String> = self
            .shared
            .state
            .borrow()
            .questions
            .iter()
            .filter(|q| {
                q.required
                    && !answers
                        .get(&q.question_id)
                        .is_some_and(|answer| !answer.trim().is_empty())
            })
            .map(|q| q.question_id.clone())
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "submitting without answers to required questions");
        }

        self.cancel_active().await;
        let epoch = self.shared.advance(PipelineState::begin_answers);

        let payload = serde_json::to_value(answers)
            .map_err(|err| AppError::Validation(format!("answers not serializable: {err}")))?;
        let request = StreamRequest {
            endpoint: EndpointKind::SubmitAnswers { session_id },
            payload,
        };
        self.launch(epoch, request).await
    }

    /// Stop the active stream, if any. Never fails; state is kept as-is.
    pub async fn cancel(&self) {
        self.cancel_active().await;
        self.shared.advance(|state| state.generating = false);
    }

    /// Cancel any active stream and return to an empty session.
    pub async fn reset(&self) {
        self.cancel_active().await;
        self.shared.advance(|state| *state = PipelineState::new());
        info!("pipeline state reset");
    }

    async fn cancel_active(&self) {
        if let Some(handle) = self.shared.active.lock().await.take() {
            info!(run_id = handle.run_id(), "cancelling active stream");
            handle.cancel();
        }
    }

    async fn launch(&self, epoch: u64, request: StreamRequest) -> Result<RunHandle> {
        let handle = TransportHandle::new();
        {
            let mut active = self.shared.active.lock().await;
            if self.shared.epoch.load(Ordering::SeqCst) == epoch {
                if let Some(prev) = active.replace(handle.clone()) {
                    info!(run_id = prev.run_id(), "cancelling stream replaced by a newer run");
                    prev.cancel();
                }
            } else {
                // A newer call already advanced the epoch; this run never becomes active.
                debug!(run_id = handle.run_id(), "superseded before launch");
                handle.cancel();
            }
        }
        self.shared.apply(epoch, |state| {
            state.generating = true;
            state.error = None;
        });

        let opened = tokio::select! {
            biased;

            () = handle.token().cancelled() => {
                debug!(run_id = handle.run_id(), "cancelled before the stream opened");
                self.shared.apply(epoch, |state| state.generating = false);
                self.release(&handle).await;
                return Ok(RunHandle::new(handle, None));
            }

            opened = self.transport.open(request) => opened,
        };

        let opened = match opened {
            Ok(opened) => opened,
            Err(err) => {
                self.shared.apply(epoch, |state| {
                    state.fail(err.message());
                    state.generating = false;
                });
                self.release(&handle).await;
                return Err(err);
            }
        };

        if let Some(session_id) = opened.session_id {
            self.shared.apply(epoch, |state| {
                if state.session_id().is_none() {
                    state.set_session_id(session_id);
                }
            });
        }

        let shared = Arc::clone(&self.shared);
        let run = handle.clone();
        let idle_timeout = self.idle_timeout;
        let mut decoder = FrameDecoder::with_max_line_bytes(self.max_frame_bytes);
        let span = info_span!("generation_run", run_id = handle.run_id(), epoch);

        let join = tokio::spawn(
            async move {
                let read = read_frames(
                    run.run_id(),
                    opened.body,
                    &mut decoder,
                    run.token(),
                    idle_timeout,
                    |frame| {
                        let Some(event) = classify(frame) else {
                            return ControlFlow::Continue(());
                        };
                        let terminal = matches!(event, PipelineEvent::PipelineCompleted { .. });
                        if !shared.apply(epoch, |state| dispatch(state, &event)) {
                            debug!("dropping event from superseded run");
                            return ControlFlow::Continue(());
                        }
                        if terminal && shared.state.borrow().outcome.is_some() {
                            ControlFlow::Break(())
                        } else {
                            ControlFlow::Continue(())
                        }
                    },
                )
                .await;

                match read {
                    Ok(ReadOutcome::Finished) => {
                        shared.apply(epoch, |state| state.generating = false);
                    }
                    Ok(ReadOutcome::Closed) => {
                        shared.apply(epoch, |state| {
                            state.finish_without_result();
                            state.generating = false;
                        });
                    }
                    Ok(ReadOutcome::Cancelled) => {
                        // No-op when `cancel`, `reset` or a newer run already advanced the epoch.
                        shared.apply(epoch, |state| state.generating = false);
                    }
                    Err(err) => {
                        shared.apply(epoch, |state| {
                            state.fail(err.message());
                            state.generating = false;
                        });
                    }
                }

                if decoder.skipped() > 0 {
                    warn!(skipped = decoder.skipped(), "malformed frames skipped during run");
                }

                {
                    let mut active = shared.active.lock().await;
                    if active.as_ref().is_some_and(|h| h.run_id() == run.run_id()) {
                        *active = None;
                    }
                }

                if run.is_cancelled() || shared.epoch.load(Ordering::SeqCst) != epoch {
                    return RunOutcome::Cancelled;
                }
                let outcome = RunOutcome::from_state(&shared.state.borrow());
                info!(?outcome, "run finished");
                outcome
            }
            .instrument(span),
        );

        Ok(RunHandle::new(handle, Some(join)))
    }

    async fn release(&self, handle: &TransportHandle) {
        let mut active = self.shared.active.lock().await;
        if active.as_ref().is_some_and(|h| h.run_id() == handle.run_id()) {
            *active = None;
        }
    }
}
