use anyhow::Result;
use curriculum_docs_core::{DocumentPipeline, ServiceConfig, SyllabusFetcher};

/// Application state shared by every handler.
///
/// Built once at startup and never mutated; requests share nothing else.
pub struct AppState {
    pub config: ServiceConfig,
    pub pipeline: DocumentPipeline,
    pub fetcher: SyllabusFetcher,
}

impl AppState {
    /// Create state with the LibreOffice converter and lopdf merger
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let pipeline = DocumentPipeline::new(&config);
        Self::with_pipeline(config, pipeline)
    }

    /// Create state around an existing pipeline
    pub fn with_pipeline(config: ServiceConfig, pipeline: DocumentPipeline) -> Result<Self> {
        config.validate()?;
        let fetcher = SyllabusFetcher::new(&config.fetch)?;
        Ok(Self {
            config,
            pipeline,
            fetcher,
        })
    }

    /// Largest request body the router accepts.
    ///
    /// Leaves room for a full batch plus form overhead so that oversized
    /// single files are rejected by the handlers with a JSON error.
    pub fn body_limit(&self) -> usize {
        let limits = &self.config.limits;
        limits
            .max_file_size_bytes
            .saturating_mul(limits.max_files.saturating_add(1))
            .saturating_add(1024 * 1024)
    }
}
