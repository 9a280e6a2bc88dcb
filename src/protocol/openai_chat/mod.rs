pub mod stream;

use serde::{Deserialize, Serialize};

/// `OpenAI` streaming chunk (`chat.completion.chunk`) wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<OpenAiStreamChoice>,
}

/// A choice in a streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamChoice {
    pub index: u32,
    pub delta: OpenAiDelta,
    pub finish_reason: Option<String>,
}

/// Incremental payload of a streaming choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiDeltaToolCall>>,
}

/// A tool call entry inside a streaming delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiDeltaToolCall {
    pub index: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAiDeltaFunction,
}

/// Function payload of a streaming tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiDeltaFunction {
    pub name: String,
    pub arguments: String,
}
