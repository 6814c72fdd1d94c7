//! Stream read loop.
//!
//! Pulls chunks from an opened [`ByteStream`], reassembles frames with a
//! [`FrameDecoder`] and hands each frame to a caller-supplied callback in
//! arrival order. The loop ends when the callback reports the terminal
//! frame, the server closes the body, the handle is cancelled, or the idle
//! timeout elapses.

use std::ops::ControlFlow;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::stream::decoder::{Frame, FrameDecoder};
use crate::stream::transport::ByteStream;
use crate::{AppError, Result};

/// How a read loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The callback asked to stop; the body is released unread.
    Finished,
    /// The server closed the body.
    Closed,
    /// Cancellation was requested; not an error.
    Cancelled,
}

/// Read `body` to completion, delivering frames to `on_frame`.
///
/// `on_frame` returns [`ControlFlow::Break`] once it has seen the frame that
/// ends the exchange. Frames after it in the same chunk are dropped and the
/// body is not read again, so a later read error or stall cannot follow a
/// terminal frame.
///
/// # Cancellation
///
/// `cancel` is checked before every chunk read and before every frame is
/// delivered, so no frame reaches `on_frame` after cancellation has been
/// observed. A frame already being handled runs to completion. A read error
/// raised while `cancel` is set is reported as [`ReadOutcome::Cancelled`].
///
/// # Idle timeout
///
/// With `idle_timeout` set, a gap longer than that between two chunks ends
/// the loop with an error. Server keepalive pings count as activity.
///
/// # Errors
///
/// Returns [`AppError::Transport`] on a mid-stream read failure or an idle
/// timeout. Malformed frames are skipped, never returned.
pub async fn read_frames<F>(
    run_id: &str,
    mut body: ByteStream,
    decoder: &mut FrameDecoder,
    cancel: &CancellationToken,
    idle_timeout: Option<Duration>,
    mut on_frame: F,
) -> Result<ReadOutcome>
where
    F: FnMut(Frame) -> ControlFlow<()>,
{
    loop {
        let item = tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(run_id, "stream reader: cancellation received, stopping");
                return Ok(ReadOutcome::Cancelled);
            }

            item = next_chunk(&mut body, idle_timeout) => item,
        };

        let frames = match item {
            Ok(Some(Ok(chunk))) => decoder.feed(&chunk),
            Ok(Some(Err(e))) => {
                if cancel.is_cancelled() {
                    debug!(run_id, "stream reader: read error after cancellation, ignoring");
                    return Ok(ReadOutcome::Cancelled);
                }
                warn!(run_id, error = %e, "stream reader: read error, stopping");
                return Err(e);
            }
            Ok(None) => {
                debug!(run_id, buffered = decoder.buffered_len(), "stream reader: EOF detected");
                let tail = decoder.finish();
                return Ok(match deliver(tail, cancel, &mut on_frame) {
                    Some(stopped) => stopped,
                    None => ReadOutcome::Closed,
                });
            }
            Err(e) => {
                warn!(run_id, error = %e, "stream reader: idle timeout, stopping");
                return Err(e);
            }
        };

        match deliver(frames, cancel, &mut on_frame) {
            Some(ReadOutcome::Cancelled) => {
                debug!(run_id, "stream reader: cancelled mid-chunk, dropping remaining frames");
                return Ok(ReadOutcome::Cancelled);
            }
            Some(stopped) => {
                debug!(run_id, "stream reader: terminal frame handled, releasing body");
                return Ok(stopped);
            }
            None => {}
        }
    }
}

/// Deliver frames in order; returns how delivery was cut short, if it was.
fn deliver<F>(
    frames: Vec<Frame>,
    cancel: &CancellationToken,
    on_frame: &mut F,
) -> Option<ReadOutcome>
where
    F: FnMut(Frame) -> ControlFlow<()>,
{
    for frame in frames {
        if cancel.is_cancelled() {
            return Some(ReadOutcome::Cancelled);
        }
        if on_frame(frame).is_break() {
            return Some(ReadOutcome::Finished);
        }
    }
    cancel.is_cancelled().then_some(ReadOutcome::Cancelled)
}

async fn next_chunk(
    body: &mut ByteStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<Result<bytes::Bytes>>> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, body.next())
            .await
            .map_err(|_| AppError::Transport(format!("stream idle for {limit:?}"))),
        None => Ok(body.next().await),
    }
}
