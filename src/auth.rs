use http::header::AUTHORIZATION;

use crate::error::RelayError;

/// Extract the caller's bearer token, which is forwarded to the backend as-is.
///
/// # Errors
///
/// Returns [`RelayError::MissingCredential`] when no non-empty
/// `Authorization: Bearer <token>` header is present.
pub fn extract_credential(headers: &http::HeaderMap) -> Result<&str, RelayError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| RelayError::MissingCredential("Missing bearer token".to_string()))
}
