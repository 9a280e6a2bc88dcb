use serde::{Deserialize, Serialize};

/// Text conventionally used to render the start of a thinking section.
pub const THINKING_OPEN_MARKER: &str = "<think>\n";
/// Text conventionally used to render the end of a thinking section.
pub const THINKING_CLOSE_MARKER: &str = "\n</think>\n";

/// Arguments used when the backend omits them.
pub const EMPTY_ARGUMENTS: &str = "{}";

/// One function-call request produced by the backend.
///
/// `id` and `name` are empty when the backend omitted them; `arguments` is an
/// opaque JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A backend-agnostic increment of a generation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// Fragment of final answer text.
    Text(String),
    /// Opens a run of thinking fragments.
    ThinkingStart,
    /// Fragment of intermediate reasoning.
    Thinking(String),
    /// Closes a run of thinking fragments.
    ThinkingEnd,
    /// Completed batch of tool calls for the current turn.
    ToolCalls(Vec<ToolCallRequest>),
}

impl NormalizedEvent {
    /// Whether this event belongs to a thinking section, boundaries included.
    #[must_use]
    pub fn is_thinking(&self) -> bool {
        matches!(
            self,
            NormalizedEvent::ThinkingStart
                | NormalizedEvent::Thinking(_)
                | NormalizedEvent::ThinkingEnd
        )
    }

    /// Thinking content as it would appear in a `<think>`-tagged transcript.
    ///
    /// Returns `None` for non-thinking events.
    #[must_use]
    pub fn thinking_text(&self) -> Option<&str> {
        match self {
            NormalizedEvent::ThinkingStart => Some(THINKING_OPEN_MARKER),
            NormalizedEvent::Thinking(text) => Some(text),
            NormalizedEvent::ThinkingEnd => Some(THINKING_CLOSE_MARKER),
            NormalizedEvent::Text(_) | NormalizedEvent::ToolCalls(_) => None,
        }
    }
}
