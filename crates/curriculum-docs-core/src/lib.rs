//! Curriculum Docs Core Library
//!
//! This library provides the document operations behind the service:
//! - Title insertion into DOCX documents
//! - DOCX composition (appending one document onto another)
//! - DOCX to PDF conversion via headless LibreOffice
//! - PDF concatenation
//! - Upstream document fetching

pub mod config;
pub mod convert;
pub mod docx;
pub mod error;
pub mod fetch;
pub mod pdf;
pub mod util;

pub use config::{
    ConverterConfig, FetchConfig, LimitsConfig, MergeConfig, MergeFallback, ServiceConfig,
    TitleStyle, DEFAULT_HOST, DEFAULT_PORT,
};
pub use convert::{Converter, LibreOfficeConverter, ToolStatus, create_converter};
pub use docx::{Composer, DOCX_MIME, compose, insert_title};
pub use error::{Error, Result};
pub use fetch::SyllabusFetcher;
pub use pdf::{LopdfMerger, PDF_MIME, PdfMerger, create_merger};

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One uploaded file
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Result of converting and merging a batch of documents
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub pdf: Vec<u8>,
    /// Only the first document is included because merging failed
    pub degraded: bool,
    /// Number of converted documents
    pub sources: usize,
}

/// Conversion and merging, combined under the configured fallback policy
pub struct DocumentPipeline {
    converter: Arc<dyn Converter>,
    merger: Arc<dyn PdfMerger>,
    fallback: MergeFallback,
}

impl DocumentPipeline {
    /// Create a pipeline with the default LibreOffice converter and lopdf merger
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            converter: create_converter(&config.converter),
            merger: create_merger(),
            fallback: config.merge.fallback,
        }
    }

    /// Create with custom components
    pub fn with_components(
        converter: Arc<dyn Converter>,
        merger: Arc<dyn PdfMerger>,
        fallback: MergeFallback,
    ) -> Self {
        Self {
            converter,
            merger,
            fallback,
        }
    }

    pub fn converter(&self) -> &dyn Converter {
        self.converter.as_ref()
    }

    pub const fn fallback(&self) -> MergeFallback {
        self.fallback
    }

    /// Probe the converter's external tool
    pub async fn probe(&self) -> ToolStatus {
        self.converter.probe().await
    }

    /// Convert one document to PDF
    pub async fn convert(&self, file: &UploadedFile) -> Result<Vec<u8>> {
        debug!(
            "Converting {} ({} bytes) with {}",
            file.filename,
            file.bytes.len(),
            self.converter.name()
        );
        self.converter.convert(&file.bytes, &file.filename).await
    }

    /// Convert documents one after another, keeping their order.
    ///
    /// Stops at the first failure.
    pub async fn convert_all(
        &self,
        files: &[UploadedFile],
        progress_callback: Option<Box<dyn Fn(usize, usize) + Send + Sync>>,
    ) -> Result<Vec<Vec<u8>>> {
        let mut pdfs = Vec::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            pdfs.push(self.convert(file).await?);

            if let Some(ref callback) = progress_callback {
                callback(i + 1, files.len());
            }
        }
        Ok(pdfs)
    }

    /// Merge PDFs, applying the fallback policy when the merger is unavailable
    pub async fn merge(&self, pdfs: Vec<Vec<u8>>) -> Result<MergeOutcome> {
        let sources = pdfs.len();
        let first = match self.fallback {
            MergeFallback::FirstDocument => pdfs.first().cloned(),
            MergeFallback::Fail => None,
        };

        // Merging parses every input; keep it off the async runtime
        let merger = Arc::clone(&self.merger);
        let merged = tokio::task::spawn_blocking(move || merger.merge(&pdfs))
            .await
            .map_err(|e| Error::MergeUnavailable(format!("merge task failed: {e}")))?;

        match (merged, first) {
            (Ok(pdf), _) => {
                info!("Merged {} PDFs with {} ({} bytes)", sources, self.merger.name(), pdf.len());
                Ok(MergeOutcome {
                    pdf,
                    degraded: false,
                    sources,
                })
            }
            (Err(Error::MergeUnavailable(reason)), Some(pdf)) => {
                warn!(
                    "PDF merge unavailable ({}); returning only the first of {} documents",
                    reason, sources
                );
                Ok(MergeOutcome {
                    pdf,
                    degraded: true,
                    sources,
                })
            }
            (Err(e), _) => Err(e),
        }
    }

    /// Convert every document in order, then merge the results
    pub async fn convert_and_merge(&self, files: &[UploadedFile]) -> Result<MergeOutcome> {
        if files.is_empty() {
            return Err(Error::EmptyInput);
        }
        let pdfs = self.convert_all(files, None).await?;
        self.merge(pdfs).await
    }
}
