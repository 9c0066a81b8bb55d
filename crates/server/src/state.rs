//! Application state shared across handlers.

use crate::upload::UploadPipeline;
use chartvault_core::config::AppConfig;
use chartvault_metadata::MetadataStore;
use chartvault_storage::{ObjectStore, TempStore};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upload pipeline wired to the stores above.
    pub pipeline: Arc<UploadPipeline>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        temp_store: TempStore,
    ) -> Self {
        let pipeline = UploadPipeline::new(temp_store, storage.clone(), metadata.clone());

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Temp store used for upload intake.
    pub fn temp_store(&self) -> &TempStore {
        self.pipeline.temp_store()
    }
}
