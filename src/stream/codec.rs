//! Line codec for pipeline event streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so an
//! unterminated or oversized record from a misbehaving server cannot grow
//! the reassembly buffer without bound.
//!
//! Lines are delimited by `\n`; a trailing `\r` is stripped by the inner
//! codec, so `\r\n` streams decode identically.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Default maximum line length accepted by [`FrameCodec`]: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline framing for the event stream.
///
/// # Decoder
///
/// Returns `Ok(None)` while `src` holds no complete line; the partial tail
/// stays in `src` until more bytes arrive. Lines longer than the configured
/// limit return [`AppError::Frame`]`("line too long: …")`; the inner codec
/// then discards input up to the next newline and decoding resumes.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LinesCodec,
    max_line_bytes: usize,
}

impl FrameCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_line_bytes),
            max_line_bytes,
        }
    }

    fn map_error(&self, e: LinesCodecError) -> AppError {
        match e {
            LinesCodecError::MaxLineLengthExceeded => AppError::Frame(format!(
                "line too long: exceeded {} bytes",
                self.max_line_bytes
            )),
            // The inner codec reports invalid UTF-8 as `InvalidData` after
            // consuming the offending line.
            LinesCodecError::Io(io_err) if io_err.kind() == std::io::ErrorKind::InvalidData => {
                AppError::Frame(format!("invalid utf-8: {io_err}"))
            }
            LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode(src).map_err(|e| self.map_error(e))
    }

    /// Flush the final unterminated line when the stream closes.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode_eof(src).map_err(|e| self.map_error(e))
    }
}
