use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{Stream, StreamExt};

use super::{AntigravityCandidate, AntigravityPart, AntigravityStreamChunk};
use crate::error::RelayError;
use crate::protocol::event::{NormalizedEvent, ToolCallRequest};
use crate::stream::{data_payload, is_done_payload, timed_line_stream};
use crate::util::truncate_chars;

const LOGGED_PAYLOAD_MAX_CHARS: usize = 120;

/// What the caller should do after feeding one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    Continue,
    /// The end-of-stream sentinel was seen; stop reading.
    Done,
}

/// Per-connection decode state for an Antigravity stream.
///
/// Tracks whether a thinking section is open and the tool calls accumulated
/// since the last completion signal. Build a fresh decoder for every
/// connection attempt.
#[derive(Debug, Default)]
pub struct AntigravityStreamDecoder {
    thinking_open: bool,
    pending_calls: Vec<ToolCallRequest>,
}

impl AntigravityStreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_thinking_open(&self) -> bool {
        self.thinking_open
    }

    #[must_use]
    pub fn pending_tool_calls(&self) -> &[ToolCallRequest] {
        &self.pending_calls
    }

    /// Decode one raw line, appending normalized events to `out`.
    ///
    /// Non-`data: ` lines and unparseable records are skipped.
    pub fn decode_line_into(&mut self, line: &str, out: &mut Vec<NormalizedEvent>) -> DecodeStep {
        let Some(payload) = data_payload(line) else {
            return DecodeStep::Continue;
        };
        if is_done_payload(payload) {
            return DecodeStep::Done;
        }
        match serde_json::from_str::<AntigravityStreamChunk>(payload) {
            Ok(chunk) => self.decode_chunk_into(chunk, out),
            Err(err) => {
                tracing::debug!(
                    error = %err,
                    payload = truncate_chars(payload, LOGGED_PAYLOAD_MAX_CHARS),
                    "skipping unparseable upstream record"
                );
            }
        }
        DecodeStep::Continue
    }

    /// Decode one parsed record, appending normalized events to `out`.
    pub fn decode_chunk_into(&mut self, chunk: AntigravityStreamChunk, out: &mut Vec<NormalizedEvent>) {
        let Some(candidate) = chunk
            .response
            .and_then(|response| response.candidates)
            .and_then(|candidates| candidates.into_iter().next())
        else {
            return;
        };
        self.decode_candidate_into(candidate, out);
    }

    fn decode_candidate_into(&mut self, candidate: AntigravityCandidate, out: &mut Vec<NormalizedEvent>) {
        let finished = candidate.is_finished();
        let parts = candidate
            .content
            .and_then(|content| content.parts)
            .unwrap_or_default();

        for part in parts.iter().filter_map(AntigravityPart::from_value) {
            match part {
                AntigravityPart::Thought(text) => {
                    if !self.thinking_open {
                        out.push(NormalizedEvent::ThinkingStart);
                        self.thinking_open = true;
                    }
                    out.push(NormalizedEvent::Thinking(text));
                }
                AntigravityPart::Text(text) => {
                    self.close_thinking_into(out);
                    out.push(NormalizedEvent::Text(text));
                }
                AntigravityPart::FunctionCall(call) => self.pending_calls.push(call),
            }
        }

        if finished && !self.pending_calls.is_empty() {
            self.close_thinking_into(out);
            out.push(NormalizedEvent::ToolCalls(std::mem::take(
                &mut self.pending_calls,
            )));
        }
    }

    /// Graceful end of stream: close an open thinking section.
    pub fn finish_into(&mut self, out: &mut Vec<NormalizedEvent>) {
        self.close_thinking_into(out);
        if !self.pending_calls.is_empty() {
            tracing::debug!(
                dropped = self.pending_calls.len(),
                "upstream stream ended without a completion signal for pending tool calls"
            );
            self.pending_calls.clear();
        }
    }

    #[inline]
    fn close_thinking_into(&mut self, out: &mut Vec<NormalizedEvent>) {
        if self.thinking_open {
            out.push(NormalizedEvent::ThinkingEnd);
            self.thinking_open = false;
        }
    }
}

/// Decode every line of a complete in-memory stream.
///
/// Stops at the sentinel and closes an open thinking section at the end.
#[must_use]
pub fn decode_antigravity_lines<'a, I>(lines: I) -> Vec<NormalizedEvent>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut decoder = AntigravityStreamDecoder::new();
    let mut out = Vec::new();
    for line in lines {
        if decoder.decode_line_into(line, &mut out) == DecodeStep::Done {
            break;
        }
    }
    decoder.finish_into(&mut out);
    out
}

struct DecodeState<L> {
    lines: std::pin::Pin<Box<L>>,
    decoder: AntigravityStreamDecoder,
    scratch: Vec<NormalizedEvent>,
    pending: VecDeque<NormalizedEvent>,
    finished: bool,
}

/// Lazily decode an upstream response body into normalized events.
///
/// Every body read is bounded by `timeout`. A read failure is yielded as the
/// final `Err` item; a graceful end (sentinel or body end) closes any open
/// thinking section first.
pub fn decode_antigravity_stream<S, E>(
    byte_stream: S,
    timeout: Duration,
) -> impl Stream<Item = Result<NormalizedEvent, RelayError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        lines: Box::pin(timed_line_stream(byte_stream, timeout)),
        decoder: AntigravityStreamDecoder::new(),
        scratch: Vec::with_capacity(4),
        pending: VecDeque::with_capacity(4),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            match state.lines.next().await {
                Some(Ok(line)) => {
                    let step = state.decoder.decode_line_into(&line, &mut state.scratch);
                    if step == DecodeStep::Done {
                        state.decoder.finish_into(&mut state.scratch);
                        state.finished = true;
                    }
                    state.pending.extend(state.scratch.drain(..));
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.decoder.finish_into(&mut state.scratch);
                    state.pending.extend(state.scratch.drain(..));
                    state.finished = true;
                }
            }
        }
    })
}
