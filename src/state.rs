use std::sync::Arc;

use crate::config::RenderConfig;
use crate::preview::PreviewRegistry;
use crate::render::RenderPipeline;

/// Shared across workers through `web::Data`.
pub struct AppState {
    pub pipeline: Arc<RenderPipeline>,
    pub previews: PreviewRegistry,
}

impl AppState {
    pub fn new(pipeline: Arc<RenderPipeline>, previews: PreviewRegistry) -> Self {
        Self { pipeline, previews }
    }

    /// Typst-backed pipeline whose PRINT previews are served by this process.
    pub fn from_config(config: &RenderConfig) -> Self {
        let previews = PreviewRegistry::new(&config.public_base_url, config.preview_idle);
        let pipeline = RenderPipeline::from_config(config, Arc::new(previews.clone()));
        Self::new(Arc::new(pipeline), previews)
    }
}
