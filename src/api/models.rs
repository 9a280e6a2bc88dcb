use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;

use crate::auth::extract_credential;
use crate::error::RelayError;
use crate::protocol::antigravity::models::{
    to_openai_model_list, AntigravityModelsResponse, OpenAiModelList,
};
use crate::state::AppState;
use crate::transport::HttpTransport;

/// Fetch the models the credential can use and convert them to an `OpenAI` list.
///
/// # Errors
///
/// Returns the transport error of the listing call, or
/// [`RelayError::Internal`] when the backend answers with an unreadable body.
pub async fn fetch_available_models(
    transport: &HttpTransport,
    models_url: &str,
    credential: &str,
    timeout: Duration,
) -> Result<OpenAiModelList, RelayError> {
    let body = transport
        .post_json(models_url, credential, Bytes::from_static(b"{}"), timeout)
        .await?;
    let response: AntigravityModelsResponse = serde_json::from_slice(&body)
        .map_err(|err| RelayError::Internal(format!("Invalid models response: {err}")))?;
    Ok(to_openai_model_list(response))
}

/// List backend models in `OpenAI` format using the caller's credential.
pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let credential = match extract_credential(&headers) {
        Ok(credential) => credential,
        Err(err) => return err.into_response(),
    };

    match fetch_available_models(
        &state.transport,
        &state.config.backend.models_endpoint,
        credential,
        state.timeout(),
    )
    .await
    {
        Ok(list) => Json(list).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "model listing failed");
            err.into_response()
        }
    }
}
