//! Event stream handling.
//!
//! - `transport`: opens the cancelable HTTP byte stream for each phase.
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based line framing with a size cap.
//! - `decoder`: reassembles chunks into [`Frame`](decoder::Frame)s.
//! - `reader`: the read loop tying the three together under cancellation
//!   and an idle timeout.

pub mod codec;
pub mod decoder;
pub mod reader;
pub mod transport;
