use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::auth::extract_credential;
use crate::error::{error_sse_record, RelayError};
use crate::failover::stream_generate;
use crate::protocol::openai_chat::stream::{openai_chunk_stream, StreamSession};
use crate::state::AppState;
use crate::transport::GenerationRequest;

/// Body of `POST /v1/stream`.
///
/// `request` is the backend payload and is forwarded untouched; `model` only
/// names the outward chunks.
#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    pub model: String,
    pub request: serde_json::Value,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub created: Option<u64>,
}

pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match relay(&state, &headers, &body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn relay(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Response, RelayError> {
    let credential = extract_credential(headers)?;
    let request: StreamRequest = serde_json::from_slice(body)
        .map_err(|err| RelayError::InvalidRequest(format!("Invalid stream request: {err}")))?;
    if request.model.trim().is_empty() {
        return Err(RelayError::InvalidRequest("model must not be empty".to_string()));
    }
    let generation = GenerationRequest::from_json(&request.request)?;

    let events = stream_generate(
        &state.transport,
        &generation,
        credential,
        state.endpoints(),
        state.timeout(),
    )
    .await?;

    let session = StreamSession::with_ids(request.model, request.stream_id, request.created);
    let records = openai_chunk_stream(events, session).map(|item| {
        Ok::<Bytes, Infallible>(match item {
            Ok(record) => record,
            Err(err) => Bytes::from(error_sse_record(&err)),
        })
    });

    Ok(sse_ok_response(Body::from_stream(records)))
}

#[inline]
fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
