use super::ServerConfig;
use crate::extract::Extractor;
use crate::store::DocumentStore;
use std::sync::Arc;

/// Application state shared across all requests.
///
/// The extractor and the store are built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn Extractor>,
    pub store: Arc<dyn DocumentStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn DocumentStore>,
        config: ServerConfig,
    ) -> Self {
        Self {
            extractor,
            store,
            config: Arc::new(config),
        }
    }
}
