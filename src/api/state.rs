//! Application state for the API server

use crate::retention::RetentionSweeper;
use crate::source::ProgressSource;
use crate::{Config, JobRegistry};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clones) and provides
/// access to the job registry, the progress source, and configuration.
#[derive(Clone)]
pub struct AppState {
    /// Registry of live download jobs
    pub registry: JobRegistry,

    /// Resolves ids and runs downloads (yt-dlp in production)
    pub source: Arc<dyn ProgressSource>,

    /// Sweeper handle used by the `/clear` endpoint
    pub sweeper: RetentionSweeper,

    /// Configuration (read-only at runtime)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(
        registry: JobRegistry,
        source: Arc<dyn ProgressSource>,
        config: Arc<Config>,
    ) -> Self {
        let sweeper = RetentionSweeper::new(
            config.download.output_dir.clone(),
            registry.clone(),
            config.retention.max_age(),
        );
        Self {
            registry,
            source,
            sweeper,
            config,
        }
    }
}
