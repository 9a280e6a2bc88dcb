//! Line framing for `data: `-prefixed event streams.
//!
//! The backend frames every record as a single `data: {json}` line. Lines are
//! split on `\n` (a trailing `\r` is dropped) and decoded as UTF-8 one whole
//! line at a time, so multi-byte characters split across network chunks are
//! reassembled before decoding.
use std::collections::VecDeque;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use futures_util::{Stream, StreamExt};
use memchr::memchr_iter;

use crate::error::RelayError;

/// Record prefix used by both the backend and the caller-facing stream.
pub const DATA_PREFIX: &str = "data: ";
/// Payload that terminates a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Return the payload of a `data: ` line, or `None` for any other line.
#[inline]
#[must_use]
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
}

/// Whether a record payload is the end-of-stream sentinel.
#[inline]
#[must_use]
pub fn is_done_payload(payload: &str) -> bool {
    payload.trim() == DONE_SENTINEL
}

// ---------------------------------------------------------------------------
// LineSplitter: incremental line splitter
// ---------------------------------------------------------------------------

/// Incremental line splitter.
///
/// Feed it raw byte chunks arriving on arbitrary boundaries and it yields
/// complete lines without their terminators.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: BytesMut,
}

impl LineSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and append every completed line to `out`.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut VecDeque<String>) {
        self.buffer.extend_from_slice(chunk);
        let mut processed_up_to = 0usize;
        for line_end in memchr_iter(b'\n', &self.buffer) {
            out.push_back(decode_line(&self.buffer[processed_up_to..line_end]));
            processed_up_to = line_end + 1;
        }
        if processed_up_to > 0 {
            self.buffer.advance(processed_up_to);
        }
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = decode_line(&self.buffer);
        self.buffer.clear();
        Some(line)
    }

    /// Bytes buffered for the current incomplete line.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

struct LineStreamState<S> {
    bytes: std::pin::Pin<Box<S>>,
    splitter: LineSplitter,
    pending: VecDeque<String>,
    timeout: Duration,
    finished: bool,
}

/// Split a response body into lines, bounding every read by `timeout`.
///
/// A read that exceeds the timeout yields [`RelayError::Timeout`]; a body
/// error yields [`RelayError::Transport`]. Either ends the stream. Dropping the
/// returned stream drops the underlying body.
pub fn timed_line_stream<S, E>(
    byte_stream: S,
    timeout: Duration,
) -> impl Stream<Item = Result<String, RelayError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = LineStreamState {
        bytes: Box::pin(byte_stream),
        splitter: LineSplitter::new(),
        pending: VecDeque::with_capacity(8),
        timeout,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                return Some((Ok(line), state));
            }
            if state.finished {
                return None;
            }

            match tokio::time::timeout(state.timeout, state.bytes.next()).await {
                Err(_) => {
                    state.finished = true;
                    let elapsed = state.timeout;
                    return Some((Err(RelayError::Timeout { elapsed }), state));
                }
                Ok(Some(Ok(chunk))) => {
                    state.splitter.feed_into(&chunk, &mut state.pending);
                }
                Ok(Some(Err(err))) => {
                    state.finished = true;
                    let err = RelayError::Transport(format!("Failed to read upstream body: {err}"));
                    return Some((Err(err), state));
                }
                Ok(None) => {
                    state.finished = true;
                    if let Some(line) = state.splitter.finish() {
                        state.pending.push_back(line);
                    }
                }
            }
        }
    })
}
