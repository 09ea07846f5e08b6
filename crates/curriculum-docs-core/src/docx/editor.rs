//! Title insertion.

use tracing::debug;

use super::package::DocxPackage;
use super::xml::{self, BODY_PATH, Container};
use crate::config::TitleStyle;
use crate::error::{Error, Result};

/// Insert `title` as a new paragraph before the first body-level paragraph.
///
/// The run uses the style's font for the ascii, high-ANSI and complex-script
/// slots. Every other part is written back unchanged.
pub fn insert_title(docx: &[u8], title: &str, style: &TitleStyle) -> Result<Vec<u8>> {
    let mut package = DocxPackage::from_bytes(docx)?;
    let document = package.document_xml()?;
    let body = Container::parse(&document, BODY_PATH)?;

    let first = body
        .children_named("p")
        .next()
        .ok_or_else(|| Error::MalformedDocument("document has no paragraphs".to_string()))?;

    let updated = xml::splice(&document, first.range.start, &title_paragraph(title, style));
    package.set_document_xml(updated);

    debug!(title_len = title.len(), "Inserted title paragraph");
    package.to_bytes()
}

fn title_paragraph(title: &str, style: &TitleStyle) -> String {
    let font = xml::escape(&style.font);
    let size = style.half_points();
    let bold = if style.bold { "<w:b/><w:bCs/>" } else { "" };
    // Control characters other than tab are not allowed in XML 1.0 text
    let text: String = title.chars().filter(|c| !c.is_control() || *c == '\t').collect();

    format!(
        concat!(
            "<w:p><w:r><w:rPr>",
            r#"<w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}"/>"#,
            "{bold}",
            r#"<w:sz w:val="{size}"/><w:szCs w:val="{size}"/>"#,
            "</w:rPr>",
            r#"<w:t xml:space="preserve">{text}</w:t>"#,
            "</w:r></w:p>"
        ),
        font = font,
        bold = bold,
        size = size,
        text = xml::escape(&text),
    )
}
