use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a non-secret config summary.
pub async fn handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "antigravity-rs is running",
        "config": {
            "endpoint_count": state.endpoints().len(),
            "timeout_secs": config.server.timeout,
            "proxy_enabled": config.server.proxy_url().is_some(),
            "features": {
                "log_level": config.features.log_level,
            }
        }
    }))
}
