use std::sync::Arc;

use dlsync_core::{Config, DownloadManager, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    manager: Arc<DownloadManager>,
}

impl AppState {
    pub fn new(config: Config, manager: Arc<DownloadManager>) -> Self {
        Self { config, manager }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn manager(&self) -> &DownloadManager {
        self.manager.as_ref()
    }
}
