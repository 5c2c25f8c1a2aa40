use crate::config::ServerConfig;
use index::{IndexError, RetrievalService, SearchBackend};
use std::sync::Arc;

/// Shared application state
///
/// Holds the one backend handle every request goes through. It is built at
/// start-up and dropped with the router at shutdown.
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Read side over the shared backend
    pub retrieval: RetrievalService,
}

impl ServerState {
    /// Create new server state, building the backend from the configuration.
    pub fn new(config: ServerConfig) -> Result<Self, IndexError> {
        let backend = config.backend_config().build()?;
        Ok(Self::with_backend(config, backend))
    }

    /// Build state around an existing backend (e.g., in-memory for tests).
    pub fn with_backend(config: ServerConfig, backend: Arc<dyn SearchBackend>) -> Self {
        let retrieval = RetrievalService::new(backend, config.backend_timeout());
        Self {
            config: Arc::new(config),
            retrieval,
        }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        self.retrieval.backend()
    }
}
