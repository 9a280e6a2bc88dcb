use std::time::Duration;

use crate::config::AppConfig;
use crate::error::RelayError;
use crate::transport::{EndpointCandidate, HttpTransport};

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    endpoints: Vec<EndpointCandidate>,
}

impl AppState {
    /// Build state from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the HTTP client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, RelayError> {
        let transport = HttpTransport::new(&config.server)?;
        Ok(Self::new(config, transport))
    }

    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let endpoints = config.backend.endpoint_candidates();
        Self {
            config,
            transport,
            endpoints,
        }
    }

    /// Streaming endpoints in failover order.
    #[must_use]
    pub fn endpoints(&self) -> &[EndpointCandidate] {
        &self.endpoints
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.config.server.timeout_duration()
    }
}
