use bytes::Bytes;

use crate::error::RelayError;

/// One streaming endpoint in failover order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidate {
    pub url: String,
}

impl EndpointCandidate {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Generation payload shared by every endpoint attempt of one request.
///
/// The body is opaque to the relay and never modified between attempts.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    body: Bytes,
}

impl GenerationRequest {
    /// Serialize a JSON value once for all attempts.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] when the value cannot be serialized.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, RelayError> {
        serde_json::to_vec(value)
            .map(|body| Self { body: Bytes::from(body) })
            .map_err(|err| RelayError::InvalidRequest(format!("Invalid generation payload: {err}")))
    }

    #[must_use]
    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// Cheap handle on the payload; clones share the same buffer.
    #[must_use]
    pub fn body(&self) -> Bytes {
        self.body.clone()
    }
}
