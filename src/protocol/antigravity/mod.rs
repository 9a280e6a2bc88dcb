pub mod models;
pub mod stream;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::event::{ToolCallRequest, EMPTY_ARGUMENTS};

/// One `data: ` record of the Antigravity streaming API.
///
/// Every field is optional so that unexpected shapes degrade to "nothing to
/// emit" instead of failing the record. Parts stay untyped and are classified
/// one at a time by [`AntigravityPart::from_value`], so an oddly typed part
/// never takes its siblings down with it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AntigravityStreamChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AntigravityResponse>,
}

/// The wrapped Gemini-style response inside a stream record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntigravityResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<AntigravityCandidate>>,
}

/// A candidate in a stream record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntigravityCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<AntigravityContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<Value>,
}

impl AntigravityCandidate {
    /// Whether this candidate carries a completion signal.
    ///
    /// Any `finishReason` other than null, `false`, `0`, `""`, `[]` or `{}`
    /// counts.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.finish_reason {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::Bool(true)) => true,
            Some(Value::String(reason)) => !reason.is_empty(),
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(fields)) => !fields.is_empty(),
        }
    }
}

/// Content of a candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AntigravityContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<Value>>,
}

/// A single content part, classified.
///
/// A part with `thought: true` is reasoning; otherwise a part with a `text`
/// key is answer text and a part with a `functionCall` object is a tool call.
/// Anything else carries nothing to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AntigravityPart {
    Thought(String),
    Text(String),
    FunctionCall(ToolCallRequest),
}

impl AntigravityPart {
    #[must_use]
    pub fn from_value(part: &Value) -> Option<Self> {
        let fields = part.as_object()?;
        if fields.get("thought") == Some(&Value::Bool(true)) {
            return Some(Self::Thought(field_text(fields.get("text"))));
        }
        if let Some(text) = fields.get("text") {
            return Some(Self::Text(field_text(Some(text))));
        }
        let call = fields.get("functionCall")?.as_object()?;
        Some(Self::FunctionCall(ToolCallRequest {
            id: field_text(call.get("id")),
            name: field_text(call.get("name")),
            arguments: arguments_text(call.get("args")),
        }))
    }
}

/// Text of a scalar field: strings verbatim, null or absent as `""`, other
/// values as their JSON text.
fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Argument text of a function call. Arguments travel as a JSON string under
/// `args.query`; `"{}"` when absent.
fn arguments_text(args: Option<&Value>) -> String {
    match args.and_then(|args| args.get("query")) {
        None | Some(Value::Null) => EMPTY_ARGUMENTS.to_string(),
        Some(Value::String(query)) => query.clone(),
        Some(other) => other.to_string(),
    }
}
