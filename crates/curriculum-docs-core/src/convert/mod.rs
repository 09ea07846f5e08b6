mod libreoffice;
mod traits;
mod workspace;

pub use libreoffice::LibreOfficeConverter;
pub use traits::{Converter, ToolStatus};
pub use workspace::Workspace;

use crate::config::ConverterConfig;
use std::sync::Arc;

/// Create a converter from configuration
pub fn create_converter(config: &ConverterConfig) -> Arc<dyn Converter> {
    Arc::new(LibreOfficeConverter::new(config.clone()))
}
