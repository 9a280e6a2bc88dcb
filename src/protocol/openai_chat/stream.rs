use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::RelayError;
use crate::observability::log_stream_complete;
use crate::protocol::event::{NormalizedEvent, ToolCallRequest};
use crate::util::{push_json_string_escaped, push_u64_decimal, unix_now_millis, unix_now_secs};

const DONE_FRAME: &str = "data: [DONE]\n\n";
const FINISH_STOP: &str = "stop";
const FINISH_TOOL_CALLS: &str = "tool_calls";

/// Per-response encoder state for the caller-facing `OpenAI` stream.
///
/// `stream_id` and `created` are fixed when the session is created and reused
/// for every chunk of the response.
#[derive(Debug, Clone)]
pub struct StreamSession {
    stream_id: String,
    created: u64,
    model: String,
    thinking_open: bool,
    tool_calls_seen: bool,
    chunks_written: usize,
    reasoning_bytes: usize,
}

impl StreamSession {
    /// Start a session with generated id and timestamp.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_ids(model, None, None)
    }

    /// Start a session, generating whichever of `stream_id` / `created` is missing.
    #[must_use]
    pub fn with_ids(model: impl Into<String>, stream_id: Option<String>, created: Option<u64>) -> Self {
        let stream_id = stream_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("chatcmpl-{}", unix_now_millis()));
        let created = created.filter(|ts| *ts > 0).unwrap_or_else(unix_now_secs);
        Self {
            stream_id,
            created,
            model: model.into(),
            thinking_open: false,
            tool_calls_seen: false,
            chunks_written: 0,
            reasoning_bytes: 0,
        }
    }

    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    #[must_use]
    pub fn created(&self) -> u64 {
        self.created
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls_seen
    }

    #[must_use]
    pub fn is_thinking_open(&self) -> bool {
        self.thinking_open
    }

    /// Finish reason the terminal chunk will carry.
    #[must_use]
    pub fn finish_reason(&self) -> &'static str {
        if self.tool_calls_seen {
            FINISH_TOOL_CALLS
        } else {
            FINISH_STOP
        }
    }

    /// Encode one event into an SSE record.
    ///
    /// Thinking events never produce output; they only update session state.
    pub fn encode_event(&mut self, event: &NormalizedEvent) -> Option<String> {
        match event {
            NormalizedEvent::ThinkingStart => {
                self.thinking_open = true;
                None
            }
            NormalizedEvent::ThinkingEnd => {
                self.thinking_open = false;
                None
            }
            NormalizedEvent::Thinking(_) => {
                self.reasoning_bytes += event.thinking_text().map_or(0, str::len);
                None
            }
            NormalizedEvent::Text(text) => {
                let mut out = String::with_capacity(128 + self.prefix_len() + text.len());
                self.push_chunk_prefix(&mut out);
                out.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"content\":");
                push_json_string_escaped(&mut out, text);
                out.push_str("},\"finish_reason\":null}]}\n\n");
                self.chunks_written += 1;
                Some(out)
            }
            NormalizedEvent::ToolCalls(calls) => {
                self.tool_calls_seen = true;
                let mut out = String::with_capacity(160 + self.prefix_len() + 96 * calls.len());
                self.push_chunk_prefix(&mut out);
                out.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[");
                for (index, call) in calls.iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    push_tool_call(&mut out, index, call);
                }
                out.push_str("]},\"finish_reason\":null}]}\n\n");
                self.chunks_written += 1;
                Some(out)
            }
        }
    }

    /// Terminal chunk followed by the `[DONE]` record. Consumes the session.
    #[must_use]
    pub fn finish(self) -> String {
        let finish_reason = self.finish_reason();
        let mut out = String::with_capacity(128 + self.prefix_len() + DONE_FRAME.len());
        self.push_chunk_prefix(&mut out);
        out.push_str(",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"");
        out.push_str(finish_reason);
        out.push_str("\"}]}\n\n");
        out.push_str(DONE_FRAME);
        out
    }

    #[inline]
    fn prefix_len(&self) -> usize {
        self.stream_id.len() + self.model.len()
    }

    fn push_chunk_prefix(&self, out: &mut String) {
        out.push_str("data: {\"id\":");
        push_json_string_escaped(out, &self.stream_id);
        out.push_str(",\"object\":\"chat.completion.chunk\",\"created\":");
        push_u64_decimal(out, self.created);
        out.push_str(",\"model\":");
        push_json_string_escaped(out, &self.model);
    }
}

fn push_tool_call(out: &mut String, index: usize, call: &ToolCallRequest) {
    out.push_str("{\"index\":");
    push_u64_decimal(out, index as u64);
    out.push_str(",\"id\":");
    push_json_string_escaped(out, &call.id);
    out.push_str(",\"type\":\"function\",\"function\":{\"name\":");
    push_json_string_escaped(out, &call.name);
    out.push_str(",\"arguments\":");
    push_json_string_escaped(out, &call.arguments);
    out.push_str("}}");
}

struct EncodeState<S> {
    events: std::pin::Pin<Box<S>>,
    session: Option<StreamSession>,
    started_at: Instant,
}

/// Render a normalized event stream as `OpenAI` SSE records.
///
/// Ends with the terminal chunk and `[DONE]` when the events end normally. An
/// `Err` item is forwarded as-is and ends the output without a terminal chunk.
pub fn openai_chunk_stream<S>(
    events: S,
    session: StreamSession,
) -> impl Stream<Item = Result<Bytes, RelayError>> + Send
where
    S: Stream<Item = Result<NormalizedEvent, RelayError>> + Send + 'static,
{
    let state = EncodeState {
        events: Box::pin(events),
        session: Some(session),
        started_at: Instant::now(),
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            let session = state.session.as_mut()?;
            match state.events.next().await {
                Some(Ok(event)) => {
                    if let Some(record) = session.encode_event(&event) {
                        return Some((Ok(Bytes::from(record)), state));
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(
                        stream_id = %session.stream_id(),
                        chunks = session.chunks_written,
                        error = %err,
                        "upstream stream failed after first event"
                    );
                    state.session = None;
                    return Some((Err(err), state));
                }
                None => {
                    let session = state.session.take()?;
                    log_stream_complete(
                        session.model(),
                        session.chunks_written,
                        session.has_tool_calls(),
                        session.reasoning_bytes,
                        state.started_at.elapsed(),
                    );
                    return Some((Ok(Bytes::from(session.finish())), state));
                }
            }
        }
    })
}
