//! Integration tests for the generation orchestrator over a scripted transport.
//!
//! Covers the two-phase happy path, precondition failures, cancellation,
//! restart while streaming, and streams that end or stall without a
//! terminal frame.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;

use genstream::models::agent::{AgentName, AgentStatus};
use genstream::models::session::PostFormat;
use genstream::models::step::Step;
use genstream::pipeline::state::{PipelineState, ENDED_EARLY};
use genstream::stream::transport::EndpointKind;
use genstream::{AppError, RunOutcome};

use super::test_helpers::{
    agent_complete, agent_start, keepalive, orchestrator, phase_one_stream, phase_two_stream,
    terminal, wait_for_state, ScriptedTransport, WAIT,
};

async fn finish(handle: genstream::RunHandle) -> RunOutcome {
    tokio::time::timeout(WAIT, handle.wait())
        .await
        .expect("run finished in time")
}

// ── Happy path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_phase_generation_produces_final_post() {
    let transport = ScriptedTransport::new();
    transport.push_chunks(Some("post-9"), phase_one_stream("post-9"));
    transport.push_chunks(None, phase_two_stream("post-9"));
    let orch = orchestrator(&transport, 0);

    let handle = orch
        .start_generation("Lessons from my first year as a manager", PostFormat::Auto)
        .await
        .expect("phase 1 opens");
    let RunOutcome::AwaitingAnswers { questions } = finish(handle).await else {
        panic!("expected awaiting answers");
    };
    let ids: Vec<_> = questions.iter().map(|q| q.question_id.as_str()).collect();
    assert_eq!(ids, ["q_story", "q_lesson"]);
    assert_eq!(orch.session_id().as_deref(), Some("post-9"));
    assert_eq!(orch.snapshot().step, Step::Questions);

    let answers = BTreeMap::from([
        ("q_story".to_owned(), "I burned out".to_owned()),
        ("q_lesson".to_owned(), "Delegate early".to_owned()),
    ]);
    let handle = orch.submit_answers(&answers).await.expect("phase 2 opens");
    let RunOutcome::Completed(post) = finish(handle).await else {
        panic!("expected completed");
    };

    assert_eq!(post.hook, "I almost quit.");
    assert_eq!(post.body, "Then I changed one habit.");
    assert_eq!(post.hashtags, ["career"]);
    assert_eq!(post.quality_score, Some(8.9));
    assert_eq!(post.predicted_impressions, Some((1000, 3000)));
    assert_eq!(post.format, PostFormat::Text);

    let state = orch.snapshot();
    assert_eq!(state.step, Step::Review);
    assert!(!state.generating);
    assert_eq!(state.agent(AgentName::Visual).status, AgentStatus::Skipped);
    for agent in [
        AgentName::Validator,
        AgentName::Strategist,
        AgentName::Writer,
        AgentName::Optimizer,
    ] {
        assert_eq!(state.agent(agent).status, AgentStatus::Success, "{agent}");
    }

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].endpoint, EndpointKind::SubmitIdea);
    assert_eq!(
        requests[0].payload,
        json!({"raw_idea": "Lessons from my first year as a manager", "preferred_format": "auto"})
    );
    assert_eq!(
        requests[1].endpoint,
        EndpointKind::SubmitAnswers {
            session_id: "post-9".into()
        }
    );
    assert_eq!(
        requests[1].payload,
        json!({"q_lesson": "Delegate early", "q_story": "I burned out"})
    );
}

/// Without a session header the id comes from the terminal payload.
#[tokio::test]
async fn session_id_falls_back_to_terminal_post_id() {
    let transport = ScriptedTransport::new();
    transport.push_chunks(None, phase_one_stream("from-body"));
    let orch = orchestrator(&transport, 0);

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    assert!(matches!(finish(handle).await, RunOutcome::AwaitingAnswers { .. }));
    assert_eq!(orch.session_id().as_deref(), Some("from-body"));
}

#[tokio::test]
async fn rejected_idea_returns_to_input() {
    let transport = ScriptedTransport::new();
    transport.push_chunks(
        Some("p-r"),
        vec![
            agent_start("validator"),
            agent_complete(
                "validator",
                &json!({"decision": "REJECT", "output": {"decision": "REJECT", "reasoning": "No clear audience"}}),
            ),
            terminal(&json!({"status": "rejected", "post_id": "p-r"})),
        ],
    );
    let orch = orchestrator(&transport, 0);

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    let RunOutcome::Rejected { message } = finish(handle).await else {
        panic!("expected rejected");
    };
    assert!(message.contains("No clear audience"), "message: {message}");

    let state = orch.snapshot();
    assert_eq!(state.step, Step::Input);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn malformed_frame_does_not_abort_run() {
    let mut chunks = phase_one_stream("p-m");
    chunks.insert(1, "data: {\"event_type\": \n\n".to_owned());
    let transport = ScriptedTransport::new();
    transport.push_chunks(None, chunks);
    let orch = orchestrator(&transport, 0);

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    assert!(matches!(finish(handle).await, RunOutcome::AwaitingAnswers { .. }));
}

// ── Preconditions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_idea_is_rejected_without_request() {
    let transport = ScriptedTransport::new();
    let orch = orchestrator(&transport, 0);

    let err = orch
        .start_generation("   ", PostFormat::Text)
        .await
        .expect_err("blank idea must fail");

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(transport.opens(), 0);
    assert_eq!(orch.snapshot(), PipelineState::new());
}

#[tokio::test]
async fn answers_without_session_are_rejected_without_request() {
    let transport = ScriptedTransport::new();
    let orch = orchestrator(&transport, 0);

    let err = orch
        .submit_answers(&BTreeMap::new())
        .await
        .expect_err("no session must fail");

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(transport.opens(), 0);
}

#[tokio::test]
async fn open_failure_is_returned_and_surfaced() {
    let transport = ScriptedTransport::new();
    transport.push_failure(AppError::Transport("server returned 503: overloaded".into()));
    let orch = orchestrator(&transport, 0);

    let err = orch
        .start_generation("idea", PostFormat::Text)
        .await
        .expect_err("open must fail");

    assert!(matches!(err, AppError::Transport(_)));
    let state = orch.snapshot();
    assert_eq!(state.error.as_deref(), Some("server returned 503: overloaded"));
    assert!(!state.generating);
    assert_eq!(transport.opens(), 1);
}

// ── Cancellation ────────────────────────────────────────────────────────────

/// Frames sent after cancellation never reach the state, and cancelling
/// raises no error.
#[tokio::test]
async fn cancel_mid_stream_stops_mutation() {
    let transport = ScriptedTransport::new();
    let tx = transport.push_channel(Some("p-c"));
    let orch = orchestrator(&transport, 0);
    let mut rx = orch.subscribe();

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    tx.send(Ok(Bytes::from(agent_start("validator")))).expect("send");
    wait_for_state(&mut rx, |s| s.agent(AgentName::Validator).is_active()).await;

    orch.cancel().await;
    let after_cancel = orch.snapshot();
    assert!(!after_cancel.generating);

    let _ = tx.send(Ok(Bytes::from(agent_complete(
        "validator",
        &json!({"decision": "APPROVE"}),
    ))));
    let _ = tx.send(Ok(Bytes::from(terminal(&json!({"status": "awaiting_answers"})))));

    assert_eq!(finish(handle).await, RunOutcome::Cancelled);
    let state = orch.snapshot();
    assert_eq!(state, after_cancel);
    assert!(state.error.is_none());
    assert!(state.outcome.is_none());
    assert_eq!(transport.closed(), 1);
}

/// Cancelling through the run handle also clears the generating flag.
#[tokio::test]
async fn handle_cancel_clears_generating() {
    let transport = ScriptedTransport::new();
    let tx = transport.push_channel(Some("p-h"));
    let orch = orchestrator(&transport, 0);
    let mut rx = orch.subscribe();

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    tx.send(Ok(Bytes::from(agent_start("validator")))).expect("send");
    wait_for_state(&mut rx, |s| s.agent(AgentName::Validator).is_active()).await;

    handle.cancel();
    let state = wait_for_state(&mut rx, |s| !s.generating).await;

    assert!(state.error.is_none());
    assert!(state.outcome.is_none());
    assert_eq!(finish(handle).await, RunOutcome::Cancelled);
    assert_eq!(transport.closed(), 1);
}

#[tokio::test]
async fn cancel_without_active_run_is_noop() {
    let transport = ScriptedTransport::new();
    let orch = orchestrator(&transport, 0);

    orch.cancel().await;
    orch.cancel().await;

    assert!(orch.snapshot().error.is_none());
    assert_eq!(transport.opens(), 0);
}

/// Starting again while streaming cancels the first run; nothing from the
/// first stream leaks into the second session.
#[tokio::test]
async fn restart_cancels_prior_run() {
    let transport = ScriptedTransport::new();
    let first_tx = transport.push_channel(Some("p-1"));
    transport.push_chunks(Some("p-2"), phase_one_stream("p-2"));
    let orch = orchestrator(&transport, 0);
    let mut rx = orch.subscribe();

    let first = orch.start_generation("first idea", PostFormat::Text).await.expect("open 1");
    first_tx
        .send(Ok(Bytes::from(agent_start("validator"))))
        .expect("send");
    wait_for_state(&mut rx, |s| s.agent(AgentName::Validator).is_active()).await;

    let second = orch.start_generation("second idea", PostFormat::Text).await.expect("open 2");
    let _ = first_tx.send(Ok(Bytes::from(agent_start("writer"))));

    assert_eq!(finish(first).await, RunOutcome::Cancelled);
    assert!(matches!(finish(second).await, RunOutcome::AwaitingAnswers { .. }));

    let state = orch.snapshot();
    let session = state.session.as_ref().expect("session");
    assert_eq!(session.raw_idea, "second idea");
    assert_eq!(state.session_id(), Some("p-2"));
    assert_eq!(state.agent(AgentName::Writer).status, AgentStatus::Pending);
    assert!(state.error.is_none());
    assert_eq!(transport.opens(), 2);
    assert_eq!(transport.closed(), 2, "one cancelled body and one finished body");
}

/// Overlapping starts leave exactly one stream open; every replaced run
/// has its transport cancelled.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_leave_one_open_stream() {
    const RUNS: usize = 8;
    let transport = ScriptedTransport::new();
    let senders: Vec<_> = (0..RUNS)
        .map(|i| transport.push_channel(Some(&format!("p-{i}"))))
        .collect();
    let orch = Arc::new(orchestrator(&transport, 0));

    let tasks: Vec<_> = (0..RUNS)
        .map(|i| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.start_generation(&format!("idea {i}"), PostFormat::Text)
                    .await
                    .map(|_| ())
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("task joined").expect("start accepted");
    }

    let open = || senders.iter().filter(|tx| !tx.is_closed()).count();
    tokio::time::timeout(WAIT, async {
        while open() > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("replaced streams released");
    assert_eq!(open(), 1);
    assert!(orch.is_generating());

    orch.cancel().await;
    tokio::time::timeout(WAIT, async {
        while open() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("last stream released");
}

#[tokio::test]
async fn reset_discards_session() {
    let transport = ScriptedTransport::new();
    transport.push_chunks(Some("p-x"), phase_one_stream("p-x"));
    let orch = orchestrator(&transport, 0);

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    finish(handle).await;
    orch.reset().await;

    assert_eq!(orch.snapshot(), PipelineState::new());
    let err = orch
        .submit_answers(&BTreeMap::new())
        .await
        .expect_err("session is gone");
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(transport.opens(), 1);
}

// ── Streams ending badly ────────────────────────────────────────────────────

#[tokio::test]
async fn stream_end_without_terminal_fails() {
    let transport = ScriptedTransport::new();
    transport.push_chunks(None, vec![agent_start("validator")]);
    let orch = orchestrator(&transport, 0);

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    assert_eq!(finish(handle).await, RunOutcome::Failed(ENDED_EARLY.into()));

    let state = orch.snapshot();
    assert_eq!(state.agent(AgentName::Validator).status, AgentStatus::Error);
    assert_eq!(state.step, Step::Validator);
    assert!(!state.generating);
}

#[tokio::test]
async fn mid_stream_read_error_fails_run() {
    let transport = ScriptedTransport::new();
    let tx = transport.push_channel(None);
    let orch = orchestrator(&transport, 0);

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    tx.send(Ok(Bytes::from(agent_start("validator")))).expect("send");
    tx.send(Err(AppError::Transport("stream read failed: connection reset".into())))
        .expect("send");

    assert_eq!(
        finish(handle).await,
        RunOutcome::Failed("stream read failed: connection reset".into())
    );
    assert_eq!(
        orch.snapshot().error.as_deref(),
        Some("stream read failed: connection reset")
    );
}

#[tokio::test]
async fn idle_stream_times_out() {
    let transport = ScriptedTransport::new();
    let tx = transport.push_channel(None);
    let orch = orchestrator(&transport, 1);

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    tx.send(Ok(Bytes::from(agent_start("validator")))).expect("send");

    let outcome = finish(handle).await;
    assert_eq!(outcome, RunOutcome::Failed("stream idle for 1s".into()));
    drop(tx);
}

/// A transport failure after the terminal frame leaves the finished phase
/// untouched.
#[tokio::test]
async fn read_error_after_terminal_keeps_result() {
    let transport = ScriptedTransport::new();
    let tx = transport.push_channel(Some("p-t"));
    let orch = orchestrator(&transport, 0);
    let mut rx = orch.subscribe();

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    for chunk in phase_one_stream("p-t") {
        tx.send(Ok(Bytes::from(chunk))).expect("send");
    }
    wait_for_state(&mut rx, |s| s.step == Step::Questions).await;
    let _ = tx.send(Err(AppError::Transport(
        "stream read failed: connection reset".into(),
    )));

    assert!(matches!(finish(handle).await, RunOutcome::AwaitingAnswers { .. }));
    let state = orch.snapshot();
    assert!(state.error.is_none());
    assert!(!state.generating);
    assert_eq!(state.step, Step::Questions);
    assert_eq!(transport.closed(), 1, "body released after the terminal frame");
}

/// Keepalives reset the idle timer; the run finishes on its terminal frame
/// even though the body is never closed.
#[tokio::test]
async fn keepalives_hold_off_idle_timeout() {
    let transport = ScriptedTransport::new();
    let tx = transport.push_channel(None);
    let orch = orchestrator(&transport, 1);

    let handle = orch.start_generation("idea", PostFormat::Text).await.expect("open");
    for _ in 0..5 {
        tx.send(Ok(Bytes::from(keepalive()))).expect("send keepalive");
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    for chunk in phase_one_stream("p-k") {
        tx.send(Ok(Bytes::from(chunk))).expect("send");
    }

    assert!(matches!(finish(handle).await, RunOutcome::AwaitingAnswers { .. }));
    assert!(orch.snapshot().error.is_none());
    drop(tx);
}
