//! Application state.

use std::sync::Arc;

use storycut_blob::store_from_env;
use storycut_ml_client::HttpModelClient;
use storycut_queue::queue_from_env;
use storycut_registry::MemoryRegistry;
use storycut_worker::{ProcessingContext, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state: the API config plus the same processing
/// context the embedded orchestrator runs on.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub ctx: ProcessingContext,
}

impl AppState {
    /// Build state from the environment. The registry is process-local, so
    /// the orchestrator runs embedded in this process (see `main`).
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(MemoryRegistry::new());
        let blob = store_from_env().await?;
        let queue = queue_from_env()?;
        let model_client = Arc::new(HttpModelClient::from_env()?);

        let ctx = ProcessingContext {
            config: WorkerConfig::from_env(),
            registry,
            blob,
            queue,
            transcriber: model_client.clone(),
            describer: model_client.clone(),
            plan_model: model_client,
        };

        Ok(Self { config, ctx })
    }
}
