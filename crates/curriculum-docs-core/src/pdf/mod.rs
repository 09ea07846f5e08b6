mod merge;

pub use merge::{LopdfMerger, PdfMerger, page_count};

use std::sync::Arc;

/// Media type of a PDF download
pub const PDF_MIME: &str = "application/pdf";

/// Create the default merger
pub fn create_merger() -> Arc<dyn PdfMerger> {
    Arc::new(LopdfMerger)
}
