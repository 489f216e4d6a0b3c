use std::sync::Arc;

use explainer_pipeline::Pipeline;
use explainer_storage::ArtifactStore;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc` or is a token handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Video pipeline with its injected collaborators.
    pub pipeline: Arc<Pipeline>,
    /// Storage used directly by the delete endpoint.
    pub store: Arc<dyn ArtifactStore>,
    /// Cancelled on shutdown; each pipeline run gets a child token.
    pub shutdown: CancellationToken,
}
