use http::HeaderMap;

use crate::auth::authenticate;
use crate::backend::VertexClient;
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::normalize::RequestNormalizer;
use crate::util::{random_base36_id, unix_now_secs};

/// Shared application state accessible to all handlers. Everything in here
/// is read-only after startup; concurrent requests share it freely.
pub struct AppState {
    pub config: AppConfig,
    pub backend: VertexClient,
    pub normalizer: RequestNormalizer,
    /// Generated once per process, echoed in every response.
    pub system_fingerprint: String,
    /// Process start time, used as the `created` stamp of the model list.
    pub started_at: u64,
}

impl AppState {
    /// # Errors
    ///
    /// Returns `BridgeError::Config` when the backend client cannot be built.
    pub fn new(config: AppConfig) -> Result<Self, BridgeError> {
        let backend = VertexClient::new(&config.vertex)?;
        let normalizer = RequestNormalizer::new(&config);
        Ok(Self {
            config,
            backend,
            normalizer,
            system_fingerprint: random_base36_id(),
            started_at: unix_now_secs(),
        })
    }

    /// Authenticate an inbound request against the configured private key.
    ///
    /// # Errors
    ///
    /// Returns the matching `BridgeError::Auth*` variant on failure.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<(), BridgeError> {
        authenticate(&self.config.private_key, headers)
    }
}
