use std::collections::HashSet;
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::xml::{self, Container};
use crate::error::{Error, Result};

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const PACKAGE_RELS_PART: &str = "_rels/.rels";
const DEFAULT_MAIN_PART: &str = "word/document.xml";
const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Relationship type suffixes (the namespace prefix varies between strict and
/// transitional documents)
pub const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
pub const REL_STYLES: &str = "/styles";
pub const REL_NUMBERING: &str = "/numbering";
pub const REL_IMAGE: &str = "/image";
pub const REL_HYPERLINK: &str = "/hyperlink";

/// Cap on the up-front allocation for one part; the declared size is untrusted.
const MAX_PREALLOCATION: usize = 16 * 1024 * 1024;

/// One entry of a `.rels` part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    pub fn is_type(&self, suffix: &str) -> bool {
        self.rel_type.ends_with(suffix)
    }

    pub fn to_xml(&self) -> String {
        format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
            xml::escape(&self.id),
            xml::escape(&self.rel_type),
            xml::escape(&self.target),
            if self.external { r#" TargetMode="External""# } else { "" }
        )
    }
}

struct Part {
    name: String,
    data: Vec<u8>,
}

/// An opened DOCX package: the zip parts in their original order.
///
/// Parts are held as raw bytes; only the XML parts an operation touches are
/// decoded, and everything else is written back unchanged.
pub struct DocxPackage {
    parts: Vec<Part>,
    main_part: String,
}

impl DocxPackage {
    /// Open a package from DOCX bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::MalformedDocument(format!("not a DOCX package: {e}")))?;

        let mut parts = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| Error::MalformedDocument(format!("unreadable zip entry: {e}")))?;
            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            let capacity = usize::try_from(file.size()).unwrap_or(0).min(MAX_PREALLOCATION);
            let mut data = Vec::with_capacity(capacity);
            file.read_to_end(&mut data).map_err(|e| {
                Error::MalformedDocument(format!("failed to read part {name}: {e}"))
            })?;
            parts.push(Part { name, data });
        }

        let mut package = Self {
            parts,
            main_part: DEFAULT_MAIN_PART.to_string(),
        };
        if let Some(main_part) = package.locate_main_part() {
            package.main_part = main_part;
        }
        if !package.has_part(&package.main_part) {
            return Err(Error::MalformedDocument(format!(
                "package has no main document part ({})",
                package.main_part
            )));
        }

        Ok(package)
    }

    /// Serialize the package back to DOCX bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for part in &self.parts {
            writer
                .start_file(part.name.as_str(), options)
                .map_err(|e| Error::Io(std::io::Error::other(e)))?;
            writer.write_all(&part.data)?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        Ok(cursor.into_inner())
    }

    /// The office document target of `_rels/.rels`, if declared.
    fn locate_main_part(&self) -> Option<String> {
        self.relationships_of_rels_part(PACKAGE_RELS_PART)
            .ok()?
            .into_iter()
            .find(|rel| rel.is_type(REL_OFFICE_DOCUMENT) && !rel.external)
            .map(|rel| resolve_target("", &rel.target))
    }

    /// Path of the main document part, normally `word/document.xml`
    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.parts.iter().any(|p| p.name == name)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.data.as_slice())
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// Decode an XML part as UTF-8 text
    pub fn part_text(&self, name: &str) -> Result<String> {
        let data = self
            .part(name)
            .ok_or_else(|| Error::MalformedDocument(format!("missing part {name}")))?;
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::MalformedDocument(format!("part {name} is not UTF-8: {e}")))?;
        Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
    }

    /// Replace a part's content, or add the part at the end
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.parts.iter_mut().find(|p| p.name == name) {
            Some(part) => part.data = data,
            None => self.parts.push(Part {
                name: name.to_string(),
                data,
            }),
        }
    }

    pub fn document_xml(&self) -> Result<String> {
        self.part_text(&self.main_part)
    }

    pub fn set_document_xml(&mut self, xml: String) {
        let name = self.main_part.clone();
        self.set_part(&name, xml.into_bytes());
    }

    /// Relationships declared by `source_part` (empty when it has none)
    pub fn relationships(&self, source_part: &str) -> Result<Vec<Relationship>> {
        self.relationships_of_rels_part(&rels_path(source_part))
    }

    fn relationships_of_rels_part(&self, rels_part: &str) -> Result<Vec<Relationship>> {
        if !self.has_part(rels_part) {
            return Ok(Vec::new());
        }
        let text = self.part_text(rels_part)?;
        let root = Container::parse(&text, &["Relationships"])?;

        Ok(root
            .children_named("Relationship")
            .filter_map(|el| {
                Some(Relationship {
                    id: el.attr("Id")?.to_string(),
                    rel_type: el.attr("Type")?.to_string(),
                    target: el.attr("Target")?.to_string(),
                    external: el
                        .attr("TargetMode")
                        .is_some_and(|mode| mode.eq_ignore_ascii_case("External")),
                })
            })
            .collect())
    }

    /// First internal relationship of `source_part` whose type ends with
    /// `suffix`, with its target resolved to a part name.
    pub fn related_part(&self, source_part: &str, suffix: &str) -> Result<Option<(Relationship, String)>> {
        Ok(self
            .relationships(source_part)?
            .into_iter()
            .find(|rel| rel.is_type(suffix) && !rel.external)
            .map(|rel| {
                let part = resolve_target(source_part, &rel.target);
                (rel, part)
            }))
    }

    /// Append relationships to `source_part`'s rels part, creating it if needed
    pub fn add_relationships(&mut self, source_part: &str, rels: &[Relationship]) -> Result<()> {
        if rels.is_empty() {
            return Ok(());
        }
        let fragment: String = rels.iter().map(Relationship::to_xml).collect();
        let rels_part = rels_path(source_part);

        let updated = if self.has_part(&rels_part) {
            let text = self.part_text(&rels_part)?;
            let root = Container::parse(&text, &["Relationships"])?;
            root.append(&text, &fragment)
        } else {
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
                 <Relationships xmlns=\"{RELATIONSHIPS_NS}\">{fragment}</Relationships>"
            )
        };
        self.set_part(&rels_part, updated.into_bytes());
        Ok(())
    }

    /// A relationship id not yet used by `source_part`
    pub fn unused_relationship_id(&self, source_part: &str, taken: &mut HashSet<String>) -> Result<String> {
        if taken.is_empty() {
            taken.extend(self.relationships(source_part)?.into_iter().map(|r| r.id));
        }
        let id = (1..)
            .map(|n| format!("rIdApx{n}"))
            .find(|id| !taken.contains(id))
            .unwrap_or_default();
        taken.insert(id.clone());
        Ok(id)
    }

    /// A part name in `dir` derived from `file_name` that no part uses yet
    pub fn unused_part_name(&self, dir: &str, file_name: &str) -> String {
        let candidate = format!("{dir}/{file_name}");
        if !self.has_part(&candidate) {
            return candidate;
        }
        (1..)
            .map(|n| format!("{dir}/appendix{n}_{file_name}"))
            .find(|name| !self.has_part(name))
            .unwrap_or(candidate)
    }

    /// Register a `Default` content type for `extension` unless one exists
    pub fn ensure_default_content_type(&mut self, extension: &str, content_type: &str) -> Result<()> {
        let text = self.part_text(CONTENT_TYPES_PART)?;
        let types = Container::parse(&text, &["Types"])?;
        let exists = types
            .children_named("Default")
            .any(|d| d.attr("Extension").is_some_and(|e| e.eq_ignore_ascii_case(extension)));
        if exists {
            return Ok(());
        }

        let entry = format!(
            r#"<Default Extension="{}" ContentType="{}"/>"#,
            xml::escape(extension),
            xml::escape(content_type)
        );
        // Defaults conventionally precede overrides
        let updated = types.insert_before_first(&text, &["Override"], &entry);
        self.set_part(CONTENT_TYPES_PART, updated.into_bytes());
        Ok(())
    }

    /// Register an `Override` content type for `part` unless one exists
    pub fn ensure_override_content_type(&mut self, part: &str, content_type: &str) -> Result<()> {
        let text = self.part_text(CONTENT_TYPES_PART)?;
        let types = Container::parse(&text, &["Types"])?;
        let part_name = format!("/{part}");
        let exists = types
            .children_named("Override")
            .any(|o| o.attr("PartName") == Some(part_name.as_str()));
        if exists {
            return Ok(());
        }

        let entry = format!(
            r#"<Override PartName="{}" ContentType="{}"/>"#,
            xml::escape(&part_name),
            xml::escape(content_type)
        );
        let updated = types.append(&text, &entry);
        self.set_part(CONTENT_TYPES_PART, updated.into_bytes());
        Ok(())
    }
}

impl std::fmt::Debug for DocxPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocxPackage")
            .field("main_part", &self.main_part)
            .field("parts", &self.parts.len())
            .finish()
    }
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`
pub fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Directory of a part name (`word/document.xml` -> `word`)
pub fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Resolve a relationship target against the part that declares it.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = part_dir(source_part)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::docx::test_support::{DocxBuilder, paragraph};

    #[test]
    fn test_paths() {
        assert_eq!(rels_path("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_path("document.xml"), "_rels/document.xml.rels");
        assert_eq!(resolve_target("word/document.xml", "media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("word/document.xml", "../customXml/item1.xml"), "customXml/item1.xml");
        assert_eq!(resolve_target("word/document.xml", "/word/styles.xml"), "word/styles.xml");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn test_round_trip_keeps_parts_and_order() {
        let bytes = DocxBuilder::new().body(&paragraph("One")).build();
        let package = DocxPackage::from_bytes(&bytes).unwrap();
        let names: Vec<_> = package.part_names().map(str::to_string).collect();

        let reopened = DocxPackage::from_bytes(&package.to_bytes().unwrap()).unwrap();
        let reopened_names: Vec<_> = reopened.part_names().map(str::to_string).collect();
        assert_eq!(names, reopened_names);
        assert_eq!(names[0], CONTENT_TYPES_PART);
        assert_eq!(package.document_xml().unwrap(), reopened.document_xml().unwrap());
    }

    #[test]
    fn test_main_part_follows_package_relationship() {
        let bytes = DocxBuilder::new()
            .main_part("word/document2.xml")
            .body(&paragraph("Moved"))
            .build();
        let package = DocxPackage::from_bytes(&bytes).unwrap();
        assert_eq!(package.main_part(), "word/document2.xml");
        assert!(package.document_xml().unwrap().contains("Moved"));
    }

    #[test]
    fn test_rejects_non_docx() {
        assert!(matches!(
            DocxPackage::from_bytes(b"definitely not a zip"),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_relationship_and_content_type_edits() {
        let bytes = DocxBuilder::new().body(&paragraph("One")).build();
        let mut package = DocxPackage::from_bytes(&bytes).unwrap();
        let main = package.main_part().to_string();

        let mut taken = HashSet::new();
        let id = package.unused_relationship_id(&main, &mut taken).unwrap();
        assert_eq!(id, "rIdApx1");
        let next = package.unused_relationship_id(&main, &mut taken).unwrap();
        assert_eq!(next, "rIdApx2");

        package
            .add_relationships(
                &main,
                &[Relationship {
                    id,
                    rel_type: "http://example.com/relationships/hyperlink".to_string(),
                    target: "https://example.com/?a=1&b=2".to_string(),
                    external: true,
                }],
            )
            .unwrap();
        let rels = package.relationships(&main).unwrap();
        let added = rels.iter().find(|r| r.id == "rIdApx1").unwrap();
        assert!(added.external);
        assert_eq!(added.target, "https://example.com/?a=1&b=2");

        package.ensure_default_content_type("png", "image/png").unwrap();
        package.ensure_default_content_type("PNG", "image/png").unwrap();
        let types = package.part_text(CONTENT_TYPES_PART).unwrap();
        assert_eq!(types.matches("Extension=\"png\"").count(), 1);

        package
            .ensure_override_content_type("word/numbering.xml", "application/x-numbering")
            .unwrap();
        let types = package.part_text(CONTENT_TYPES_PART).unwrap();
        assert!(types.contains(r#"PartName="/word/numbering.xml""#));
    }

    #[test]
    fn test_unused_part_name() {
        let bytes = DocxBuilder::new()
            .body(&paragraph("One"))
            .part("word/media/image1.png", b"png")
            .build();
        let package = DocxPackage::from_bytes(&bytes).unwrap();
        assert_eq!(package.unused_part_name("word/media", "image2.png"), "word/media/image2.png");
        assert_eq!(
            package.unused_part_name("word/media", "image1.png"),
            "word/media/appendix1_image1.png"
        );
    }
}
