use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Outcome of probing a converter's external tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub available: bool,
    /// Resolved binary, when one was found
    pub binary: Option<String>,
    /// Trimmed `--version` output
    pub version: Option<String>,
    pub error: Option<String>,
}

impl ToolStatus {
    pub fn available(binary: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            available: true,
            binary: Some(binary.into()),
            version: Some(version.into()),
            error: None,
        }
    }

    pub fn unavailable(binary: Option<String>, error: impl Into<String>) -> Self {
        Self {
            available: false,
            binary,
            version: None,
            error: Some(error.into()),
        }
    }
}

/// Trait for DOCX to PDF conversion backends
#[async_trait]
pub trait Converter: Send + Sync {
    /// Backend name, used in logs
    fn name(&self) -> &'static str;

    /// Render one DOCX document to PDF bytes.
    ///
    /// `filename` is the client-supplied name; implementations must not trust it.
    async fn convert(&self, docx: &[u8], filename: &str) -> Result<Vec<u8>>;

    /// Check whether the backend can currently convert
    async fn probe(&self) -> ToolStatus;
}
