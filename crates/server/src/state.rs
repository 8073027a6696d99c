use std::sync::Arc;

use threadwatch_core::{Config, SanitizedConfig, SyncOrchestrator, TrackingStore};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<SyncOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self { config, orchestrator }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn store(&self) -> &dyn TrackingStore {
        self.orchestrator.store().as_ref()
    }
}
