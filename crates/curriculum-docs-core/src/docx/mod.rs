//! DOCX package handling: opening, title insertion and composition.

pub mod composer;
pub mod editor;
pub mod package;
pub mod xml;

#[cfg(test)]
pub(crate) mod test_support;

pub use composer::{Composer, compose};
pub use editor::insert_title;
pub use package::DocxPackage;

use crate::error::Result;
use xml::{BODY_PATH, Container};

/// Media type of a DOCX download
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Text of every body-level paragraph, in document order.
pub fn paragraph_texts(docx: &[u8]) -> Result<Vec<String>> {
    let package = DocxPackage::from_bytes(docx)?;
    let document = package.document_xml()?;
    let body = Container::parse(&document, BODY_PATH)?;
    Ok(body.children_named("p").map(|p| p.text.clone()).collect())
}

/// Number of body-level paragraphs.
pub fn paragraph_count(docx: &[u8]) -> Result<usize> {
    paragraph_texts(docx).map(|texts| texts.len())
}
