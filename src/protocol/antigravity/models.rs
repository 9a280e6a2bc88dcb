use serde::{Deserialize, Serialize};

/// Fixed `created` value reported for every backend model.
pub const MODEL_CREATED_AT: u64 = 1_700_000_000;
const MODEL_OWNER: &str = "google";

/// Response of the backend's model listing call. Only the keys are used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AntigravityModelsResponse {
    #[serde(default)]
    pub models: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A model entry in `OpenAI` list format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiModel {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

/// An `OpenAI` model list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiModelList {
    pub object: String,
    pub data: Vec<OpenAiModel>,
}

/// Convert the backend model map into an `OpenAI` model list ordered by id.
#[must_use]
pub fn to_openai_model_list(response: AntigravityModelsResponse) -> OpenAiModelList {
    let data = response
        .models
        .unwrap_or_default()
        .into_iter()
        .map(|(id, _)| OpenAiModel {
            id,
            object: "model".to_string(),
            created: MODEL_CREATED_AT,
            owned_by: MODEL_OWNER.to_string(),
        })
        .collect();
    OpenAiModelList {
        object: "list".to_string(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_models_map_to_openai_list() {
        let response: AntigravityModelsResponse = serde_json::from_value(json!({
            "models": {
                "gemini-2.5-pro": {"displayName": "Gemini 2.5 Pro"},
                "claude-sonnet-4-5": {}
            }
        }))
        .unwrap();
        let list = to_openai_model_list(response);
        assert_eq!(list.object, "list");
        let mut ids: Vec<_> = list.data.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["claude-sonnet-4-5", "gemini-2.5-pro"]);
        assert!(list
            .data
            .iter()
            .all(|m| m.created == MODEL_CREATED_AT && m.owned_by == "google" && m.object == "model"));
    }

    #[test]
    fn test_missing_models_yields_empty_list() {
        let list = to_openai_model_list(AntigravityModelsResponse::default());
        assert!(list.data.is_empty());
        let value = serde_json::to_value(&list).unwrap();
        assert_eq!(value, json!({"object": "list", "data": []}));
    }
}
