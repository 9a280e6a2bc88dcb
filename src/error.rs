use std::time::Duration;

use crate::util::push_json_string_escaped;

/// Error type shared by the transport, failover and HTTP layers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Missing credential: {0}")]
    MissingCredential(String),
    #[error("Forbidden: account is not entitled to this backend: {message}")]
    Forbidden { message: String },
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Upstream timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Whether a failed endpoint attempt may move on to the next candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverClass {
    Transient,
    Fatal,
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    Timeout,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

/// Statuses that mark an endpoint as temporarily unusable.
#[inline]
#[must_use]
pub fn is_transient_upstream_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

impl RelayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            RelayError::MissingCredential(_) => ErrorCategory::Authentication,
            RelayError::Forbidden { .. } => ErrorCategory::Permission,
            RelayError::Timeout { .. } => ErrorCategory::Timeout,
            RelayError::Config(_) | RelayError::Transport(_) | RelayError::Internal(_) => {
                ErrorCategory::ServerError
            }
            RelayError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// Classify a failure that happened before the first event was produced.
    ///
    /// Entitlement denials and request-level rejections are fatal; timeouts,
    /// rate limiting, server errors and connectivity problems are transient.
    #[must_use]
    pub fn failover_class(&self) -> FailoverClass {
        match self {
            RelayError::Timeout { .. } | RelayError::Transport(_) => FailoverClass::Transient,
            RelayError::Upstream { status, .. } if is_transient_upstream_status(*status) => {
                FailoverClass::Transient
            }
            RelayError::Upstream { .. }
            | RelayError::Forbidden { .. }
            | RelayError::InvalidRequest(_)
            | RelayError::MissingCredential(_)
            | RelayError::Config(_)
            | RelayError::Internal(_) => FailoverClass::Fatal,
        }
    }

    /// Upstream status carried by this error, if any.
    #[must_use]
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            RelayError::Upstream { status, .. } => Some(*status),
            RelayError::Forbidden { .. } => Some(403),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code / OpenAI error shape
// ---------------------------------------------------------------------------

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::Timeout => http::StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::ServerError | ErrorCategory::Unknown => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn openai_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::Permission => "permission_error",
        ErrorCategory::RateLimit => "rate_limit_error",
        ErrorCategory::Timeout => "timeout_error",
        ErrorCategory::ServerError | ErrorCategory::Unknown => "server_error",
    }
}

fn openai_error_code(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request",
        ErrorCategory::Authentication => "invalid_api_key",
        ErrorCategory::Permission => "permission_denied",
        ErrorCategory::RateLimit => "rate_limit_exceeded",
        ErrorCategory::Timeout => "upstream_timeout",
        ErrorCategory::ServerError | ErrorCategory::Unknown => "server_error",
    }
}

/// Format an error as `(status_code, OpenAI error JSON)`.
#[must_use]
pub fn format_error(err: &RelayError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let body = serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": openai_error_type(cat),
            "code": openai_error_code(cat),
            "param": null,
        }
    });
    (http_status_for_category(cat), body)
}

/// Render an error as a single SSE record for streams that already started.
#[must_use]
pub fn error_sse_record(err: &RelayError) -> String {
    let message = err.to_string();
    let cat = err.category();
    let mut out = String::with_capacity(64 + message.len());
    out.push_str("data: {\"error\":{\"message\":");
    push_json_string_escaped(&mut out, &message);
    out.push_str(",\"type\":\"");
    out.push_str(openai_error_type(cat));
    out.push_str("\"}}\n\n");
    out
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}
