use thiserror::Error;

/// Unified error type for curriculum-docs-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Fetching documents from upstream URLs
/// - DOCX package operations (opening, editing, composing, saving)
/// - Upload validation
/// - External converter invocations (missing tool, timeout, failure)
/// - PDF merging
/// - Configuration operations (loading, validation)
/// - General I/O operations
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Upstream Errors
    // ==========================================================================
    /// Fetching a source document failed (non-2xx status or transport error)
    #[error("Failed to fetch syllabus: {}", status.map_or_else(|| reason.clone(), |s| s.to_string()))]
    UpstreamFetchFailed { status: Option<u16>, reason: String },

    // ==========================================================================
    // Document Errors
    // ==========================================================================
    /// The DOCX package could not be read or has no usable body
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// An uploaded file was missing, empty, too large or of a disallowed type
    #[error("{0}")]
    InvalidUpload(String),

    // ==========================================================================
    // Converter Errors
    // ==========================================================================
    /// The external converter binary could not be found or started
    #[error("converter unavailable: {0}")]
    ToolUnavailable(String),

    /// The external converter exceeded its time bound and was killed
    #[error("conversion timed out after {seconds} seconds")]
    ConversionTimeout { seconds: u64 },

    /// Every conversion attempt failed; `diagnostics` holds the captured output
    #[error("conversion failed: {reason}")]
    ConversionFailed { reason: String, diagnostics: String },

    // ==========================================================================
    // Merge Errors
    // ==========================================================================
    /// Nothing to merge
    #[error("no PDF documents to merge")]
    EmptyInput,

    /// The merger could not combine the inputs
    #[error("PDF merge unavailable: {0}")]
    MergeUnavailable(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by a
    /// tool, upstream service or the host.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidUpload(_) | Self::EmptyInput)
    }

    /// Captured converter output, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::ConversionFailed { diagnostics, .. } if !diagnostics.is_empty() => {
                Some(diagnostics)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
