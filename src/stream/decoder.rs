//! Frame reassembly.
//!
//! Turns arbitrarily split byte chunks into complete protocol frames. The
//! stream is SSE-shaped: each record is a `data: <json>` line, optionally
//! preceded by `event:`/`id:`/`retry:` lines and followed by a blank line.
//! Only `data:` lines carry payload.
//!
//! | Line                  | Result                                   |
//! |-----------------------|------------------------------------------|
//! | `data: {…}`           | [`Frame`]                                |
//! | `data: [DONE]`        | Skipped (terminal sentinel)              |
//! | blank, `:comment`     | Skipped                                  |
//! | `event:`, other lines | Skipped; logged at `DEBUG`               |
//! | `data: <not json>`    | [`AppError::Frame`]; logged and skipped  |

use bytes::BytesMut;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::stream::codec::FrameCodec;
use crate::{AppError, Result};

/// Marker prefix of a payload-carrying line.
pub const DATA_PREFIX: &str = "data:";

/// Terminal sentinel payload; carries no data.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded protocol record.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Frame {
    /// Event kind (`agent_start`, `agent_complete`, …).
    #[serde(default)]
    pub event_type: Option<String>,
    /// Out-of-band record type; `keepalive` for server pings.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Agent the event concerns; `system` for pipeline-level events.
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Server timestamp, ISO-8601.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Execution duration reported by the server.
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
    /// Overall pipeline progress.
    #[serde(default)]
    pub progress_percent: Option<i64>,
}

impl Frame {
    /// Whether this is a server keepalive ping.
    #[must_use]
    pub fn is_keepalive(&self) -> bool {
        self.event_type.is_none() && self.kind.as_deref() == Some("keepalive")
    }
}

/// Parse one line of the stream.
///
/// # Return value
///
/// - `Ok(Some(frame))` for a well-formed `data:` line.
/// - `Ok(None)` for blank, comment, non-data and sentinel lines.
///
/// # Errors
///
/// Returns [`AppError::Frame`]`("malformed frame: …")` when a `data:` payload
/// is not a JSON object.
pub fn parse_frame_line(line: &str) -> Result<Option<Frame>> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        debug!(line, "frame decoder: skipping non-data line");
        return Ok(None);
    };

    let payload = payload.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return Ok(None);
    }

    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| AppError::Frame(format!("malformed frame: {e}")))
}

/// Incremental frame decoder.
///
/// Bytes are appended with [`feed`](Self::feed); every complete line is
/// parsed and returned in arrival order, while a trailing partial line stays
/// buffered for the next call. A malformed line is logged, counted and
/// skipped without disturbing its neighbours.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    codec: FrameCodec,
    buffer: BytesMut,
    skipped: u64,
}

impl FrameDecoder {
    /// Decoder with the default line limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder with a custom line limit.
    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            codec: FrameCodec::with_max_line_bytes(max_line_bytes),
            buffer: BytesMut::new(),
            skipped: 0,
        }
    }

    /// Append a chunk and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);
        self.drain(false)
    }

    /// Flush an unterminated final line once the stream has closed.
    pub fn finish(&mut self) -> Vec<Frame> {
        self.drain(true)
    }

    /// Number of malformed lines skipped so far.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Bytes held back waiting for a newline.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn drain(&mut self, eof: bool) -> Vec<Frame> {
        let mut frames = Vec::new();
        loop {
            let next = if eof {
                self.codec.decode_eof(&mut self.buffer)
            } else {
                self.codec.decode(&mut self.buffer)
            };

            match next {
                Ok(Some(line)) => match parse_frame_line(&line) {
                    Ok(Some(frame)) => frames.push(frame),
                    Ok(None) => {}
                    Err(e) => {
                        self.skipped += 1;
                        warn!(error = %e, raw_line = %line, "frame decoder: parse error, skipping line");
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    self.skipped += 1;
                    warn!(error = %e, "frame decoder: framing error, skipping");
                }
            }
        }
        frames
    }
}
