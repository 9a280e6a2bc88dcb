use std::pin::Pin;
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};

use crate::error::{FailoverClass, RelayError};
use crate::protocol::antigravity::stream::decode_antigravity_stream;
use crate::protocol::event::NormalizedEvent;
use crate::transport::{EndpointCandidate, GenerationRequest, HttpTransport};

const EXHAUSTED_MSG: &str = "No endpoint candidate produced a stream";

/// Normalized events of the committed endpoint.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<NormalizedEvent, RelayError>> + Send>>;

#[inline]
fn endpoint_label(idx: usize) -> &'static str {
    match idx {
        0 => "primary",
        1 => "backup",
        _ => "fallback",
    }
}

/// Stream a generation from the first endpoint that starts producing events.
///
/// Candidates are tried one at a time in order. An attempt commits as soon as
/// its decoder yields the first event (or finishes cleanly with none); from
/// then on the returned stream belongs to that endpoint and a later failure
/// ends the stream with an `Err` item instead of moving to the next endpoint.
///
/// Before commit, a transient failure moves on to the next candidate and a
/// fatal one is returned immediately. When every candidate fails transiently
/// the last error is returned unchanged.
///
/// # Errors
///
/// - [`RelayError::InvalidRequest`] when `endpoints` is empty.
/// - The fatal error of the endpoint that produced it.
/// - The last transient error when the candidates are exhausted.
pub async fn stream_generate(
    transport: &HttpTransport,
    request: &GenerationRequest,
    credential: &str,
    endpoints: &[EndpointCandidate],
    timeout: Duration,
) -> Result<EventStream, RelayError> {
    if endpoints.is_empty() {
        return Err(RelayError::InvalidRequest(
            "No endpoint candidates configured".to_string(),
        ));
    }

    let mut last_err: Option<RelayError> = None;
    for (idx, candidate) in endpoints.iter().enumerate() {
        let label = endpoint_label(idx);
        let started_at = Instant::now();
        tracing::debug!(endpoint = label, url = %candidate.url, "opening upstream stream");

        match open_candidate(transport, request, credential, candidate, timeout).await {
            Ok(events) => {
                tracing::info!(
                    endpoint = label,
                    attempt = idx + 1,
                    first_event_ms = started_at.elapsed().as_millis(),
                    "upstream stream committed"
                );
                return Ok(events);
            }
            Err(err) => {
                let has_next = idx + 1 < endpoints.len();
                match err.failover_class() {
                    FailoverClass::Transient if has_next => {
                        tracing::warn!(
                            endpoint = label,
                            status = err.upstream_status(),
                            error = %err,
                            "upstream attempt failed, trying next endpoint"
                        );
                        last_err = Some(err);
                    }
                    FailoverClass::Transient => {
                        tracing::error!(
                            endpoint = label,
                            attempts = endpoints.len(),
                            error = %err,
                            "all upstream endpoints failed"
                        );
                        return Err(err);
                    }
                    FailoverClass::Fatal => {
                        tracing::error!(
                            endpoint = label,
                            status = err.upstream_status(),
                            error = %err,
                            "upstream attempt failed with non-retryable error"
                        );
                        return Err(err);
                    }
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| RelayError::Internal(EXHAUSTED_MSG.to_string())))
}

/// Open one endpoint and wait for its first decoder outcome.
async fn open_candidate(
    transport: &HttpTransport,
    request: &GenerationRequest,
    credential: &str,
    candidate: &EndpointCandidate,
    timeout: Duration,
) -> Result<EventStream, RelayError> {
    let response = transport
        .open_stream(&candidate.url, request, credential, timeout)
        .await?;
    let mut events = Box::pin(decode_antigravity_stream(response.bytes_stream(), timeout));

    match events.next().await {
        Some(Ok(first)) => {
            let head = futures_util::stream::once(std::future::ready(Ok(first)));
            Ok(Box::pin(head.chain(events)))
        }
        Some(Err(err)) => Err(err),
        None => Ok(Box::pin(futures_util::stream::empty::<
            Result<NormalizedEvent, RelayError>,
        >())),
    }
}
