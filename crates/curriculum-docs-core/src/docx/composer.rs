//! Appending one DOCX package onto another.
//!
//! The appendix's body-level content is moved into the main document after a
//! page break. Whatever that content depends on is carried along with it:
//!
//! - styles the main document does not define (main's definitions win)
//! - list definitions, renumbered past the main document's ids
//! - image and hyperlink relationships, with media parts copied under fresh names
//! - namespace declarations used by the moved markup
//!
//! Header, footer, note and comment references are dropped, as are embedded
//! objects (charts, diagrams, OLE) whose parts are not carried over. The main
//! document keeps its own final section properties. The appendix's final section is only adopted
//! when the main document has none.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use super::package::{
    DocxPackage, REL_HYPERLINK, REL_IMAGE, REL_NUMBERING, REL_STYLES, Relationship, part_dir,
    resolve_target,
};
use super::xml::{self, BODY_PATH, Container, ReferenceMap};
use crate::error::Result;

const PAGE_BREAK: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

const STYLES_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
const NUMBERING_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml";

/// Compose `main` with an optional `appendix`.
///
/// Without an appendix the main bytes are returned as they are, once they
/// have been checked to be a readable document.
pub fn compose(main: &[u8], appendix: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut composer = Composer::new(main)?;
    let Some(appendix) = appendix else {
        return Ok(main.to_vec());
    };
    composer.append(appendix)?;
    composer.finish()
}

/// Accumulates appended documents onto a main document.
#[derive(Debug)]
pub struct Composer {
    package: DocxPackage,
    appended: usize,
}

impl Composer {
    pub fn new(main: &[u8]) -> Result<Self> {
        let package = DocxPackage::from_bytes(main)?;
        Container::parse(&package.document_xml()?, BODY_PATH)?;
        Ok(Self {
            package,
            appended: 0,
        })
    }

    /// Number of documents appended so far
    pub const fn appended(&self) -> usize {
        self.appended
    }

    /// Append `appendix` on a new page.
    pub fn append(&mut self, appendix: &[u8]) -> Result<()> {
        let source = DocxPackage::from_bytes(appendix)?;
        let source_xml = source.document_xml()?;
        let source_body = Container::parse(&source_xml, BODY_PATH)?;

        let content = source_body.children_source(&source_xml, |c| !c.is("sectPr"));
        let final_section = source_body
            .children
            .last()
            .filter(|c| c.is("sectPr"))
            .map(|c| &source_xml[c.range.clone()]);

        let mut refs = ReferenceMap::default();
        self.merge_numbering(&source, &mut refs)?;
        self.merge_styles(&source, &refs)?;

        let mut referenced = xml::relationship_refs(&content)?;
        if let Some(section) = final_section {
            referenced.extend(xml::relationship_refs(section)?);
        }
        self.merge_relationships(&source, &referenced, &mut refs)?;

        if let Err(e) = self.add_page_break() {
            warn!("Could not insert page break before appended document: {e}");
        }

        let main_xml = self.package.document_xml()?;
        let main_xml = xml::declare_namespaces(&main_xml, &xml::root_namespaces(&source_xml)?)?;
        let main_body = Container::parse(&main_xml, BODY_PATH)?;

        let mut fragment = xml::rewrite_fragment(&content, &refs)?;
        let updated = match final_section_start(&main_body) {
            Some(at) => xml::splice(&main_xml, at, &fragment),
            None => {
                if let Some(section) = final_section {
                    fragment.push_str(&xml::rewrite_fragment(section, &refs)?);
                }
                main_body.append(&main_xml, &fragment)
            }
        };
        self.package.set_document_xml(updated);

        self.appended += 1;
        debug!(
            elements = source_body.children.len(),
            relationships = refs.relationships.len(),
            "Appended document"
        );
        Ok(())
    }

    /// Serialize the composed package
    pub fn finish(self) -> Result<Vec<u8>> {
        self.package.to_bytes()
    }

    /// Add a page break paragraph at the end of the main body content.
    fn add_page_break(&mut self) -> Result<()> {
        let document = self.package.document_xml()?;
        let body = Container::parse(&document, BODY_PATH)?;
        let updated = match final_section_start(&body) {
            Some(at) => xml::splice(&document, at, PAGE_BREAK),
            None => body.append(&document, PAGE_BREAK),
        };
        self.package.set_document_xml(updated);
        Ok(())
    }

    fn merge_numbering(&mut self, source: &DocxPackage, refs: &mut ReferenceMap) -> Result<()> {
        let main_part = self.package.main_part().to_string();
        let Some((source_rel, source_part)) = source.related_part(source.main_part(), REL_NUMBERING)?
        else {
            return Ok(());
        };
        let source_text = source.part_text(&source_part)?;

        let Some((_, main_numbering)) = self.package.related_part(&main_part, REL_NUMBERING)? else {
            return self.adopt_part(&source_rel, &source_part, source_text, NUMBERING_CONTENT_TYPE);
        };

        let main_text = self.package.part_text(&main_numbering)?;
        let main_root = Container::parse(&main_text, &["numbering"])?;
        let max_id = |name: &str, attr: &str| {
            main_root
                .children_named(name)
                .filter_map(|c| c.attr(attr)?.parse::<u32>().ok())
                .max()
        };
        refs.abstract_num_offset = max_id("abstractNum", "abstractNumId").map_or(0, |m| m + 1);
        // Instance id 0 means "no list", so instances start at 1
        refs.num_id_offset = max_id("num", "numId").unwrap_or(0);

        let source_root = Container::parse(&source_text, &["numbering"])?;
        let abstracts =
            xml::rewrite_fragment(&source_root.children_source(&source_text, |c| c.is("abstractNum")), refs)?;
        let instances =
            xml::rewrite_fragment(&source_root.children_source(&source_text, |c| c.is("num")), refs)?;
        if abstracts.is_empty() && instances.is_empty() {
            return Ok(());
        }

        // Schema order: abstractNum*, num*, numIdMacAtCleanup?
        let updated = match main_root.content_end() {
            None => main_root.append(&main_text, &format!("{abstracts}{instances}")),
            Some(end) => {
                let start_of = |names: &[&str]| {
                    main_root
                        .children
                        .iter()
                        .find(|c| names.contains(&c.local_name.as_str()))
                        .map_or(end, |c| c.range.start)
                };
                let abstracts_at = start_of(&["num", "numIdMacAtCleanup"]);
                let instances_at = start_of(&["numIdMacAtCleanup"]);
                let text = xml::splice(&main_text, instances_at, &instances);
                xml::splice(&text, abstracts_at, &abstracts)
            }
        };
        self.package.set_part(&main_numbering, updated.into_bytes());
        Ok(())
    }

    fn merge_styles(&mut self, source: &DocxPackage, refs: &ReferenceMap) -> Result<()> {
        let main_part = self.package.main_part().to_string();
        let Some((source_rel, source_part)) = source.related_part(source.main_part(), REL_STYLES)?
        else {
            return Ok(());
        };
        let source_text = source.part_text(&source_part)?;

        let Some((_, main_styles)) = self.package.related_part(&main_part, REL_STYLES)? else {
            let renumbered = renumber_styles(&source_text, refs)?;
            return self.adopt_part(&source_rel, &source_part, renumbered, STYLES_CONTENT_TYPE);
        };

        let main_text = self.package.part_text(&main_styles)?;
        let main_root = Container::parse(&main_text, &["styles"])?;
        let defined: HashSet<&str> = main_root
            .children_named("style")
            .filter_map(|s| s.attr("styleId"))
            .collect();

        let source_root = Container::parse(&source_text, &["styles"])?;
        let missing = source_root.children_source(&source_text, |c| {
            c.is("style") && c.attr("styleId").is_some_and(|id| !defined.contains(id))
        });
        if missing.is_empty() {
            return Ok(());
        }

        let updated = main_root.append(&main_text, &xml::rewrite_fragment(&missing, refs)?);
        self.package.set_part(&main_styles, updated.into_bytes());
        Ok(())
    }

    /// Copy a definitions part the main document lacks, with its relationship
    /// and content type override.
    fn adopt_part(
        &mut self,
        source_rel: &Relationship,
        source_part: &str,
        text: String,
        content_type: &str,
    ) -> Result<()> {
        let main_part = self.package.main_part().to_string();
        let dir = part_dir(&main_part).to_string();
        let file_name = source_part.rsplit('/').next().unwrap_or(source_part);
        let part_name = self.package.unused_part_name(&dir, file_name);

        let mut taken = HashSet::new();
        let rel = Relationship {
            id: self.package.unused_relationship_id(&main_part, &mut taken)?,
            rel_type: source_rel.rel_type.clone(),
            target: relative_target(&dir, &part_name),
            external: false,
        };

        self.package.set_part(&part_name, text.into_bytes());
        self.package.add_relationships(&main_part, &[rel])?;
        self.package.ensure_override_content_type(&part_name, content_type)?;
        debug!(part = %part_name, "Adopted definitions part from appended document");
        Ok(())
    }

    fn merge_relationships(
        &mut self,
        source: &DocxPackage,
        referenced: &BTreeSet<String>,
        refs: &mut ReferenceMap,
    ) -> Result<()> {
        if referenced.is_empty() {
            return Ok(());
        }
        let main_part = self.package.main_part().to_string();
        let main_dir = part_dir(&main_part).to_string();
        let media_dir = if main_dir.is_empty() {
            "media".to_string()
        } else {
            format!("{main_dir}/media")
        };

        let source_rels = source.relationships(source.main_part())?;
        let mut taken = HashSet::new();
        let mut added = Vec::new();

        for id in referenced {
            let Some(rel) = source_rels.iter().find(|r| &r.id == id) else {
                debug!(id = %id, "Reference without a relationship in appended document");
                continue;
            };

            let target = if rel.is_type(REL_HYPERLINK) || (rel.is_type(REL_IMAGE) && rel.external) {
                rel.target.clone()
            } else if rel.is_type(REL_IMAGE) {
                let media = resolve_target(source.main_part(), &rel.target);
                let Some(data) = source.part(&media) else {
                    warn!(part = %media, "Image part missing from appended document");
                    continue;
                };
                let file_name = media.rsplit('/').next().unwrap_or(&media);
                let part_name = self.package.unused_part_name(&media_dir, file_name);
                self.package.set_part(&part_name, data.to_vec());
                self.register_media_type(&part_name)?;
                relative_target(&main_dir, &part_name)
            } else {
                debug!(id = %id, rel_type = %rel.rel_type, "Dropping relationship of unsupported type");
                continue;
            };

            let new_id = self.package.unused_relationship_id(&main_part, &mut taken)?;
            refs.relationships.insert(id.clone(), new_id.clone());
            added.push(Relationship {
                id: new_id,
                rel_type: rel.rel_type.clone(),
                target,
                external: rel.external,
            });
        }

        self.package.add_relationships(&main_part, &added)
    }

    fn register_media_type(&mut self, part_name: &str) -> Result<()> {
        let Some((_, extension)) = part_name.rsplit_once('.') else {
            return Ok(());
        };
        let extension = extension.to_ascii_lowercase();
        match mime_guess::from_ext(&extension).first_raw() {
            Some(content_type) => self.package.ensure_default_content_type(&extension, content_type),
            None => {
                warn!(part = %part_name, "No known content type for media part");
                Ok(())
            }
        }
    }
}

/// Start of the body's trailing `w:sectPr`, if it has one.
fn final_section_start(body: &Container) -> Option<usize> {
    body.children
        .last()
        .filter(|c| c.is("sectPr"))
        .map(|c| c.range.start)
}

/// Target of `part_name` relative to the main part's directory.
fn relative_target(dir: &str, part_name: &str) -> String {
    if dir.is_empty() {
        return part_name.to_string();
    }
    part_name
        .strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .map_or_else(|| format!("/{part_name}"), str::to_string)
}

/// Apply list renumbering to a whole styles part.
fn renumber_styles(text: &str, refs: &ReferenceMap) -> Result<String> {
    if refs.num_id_offset == 0 {
        return Ok(text.to_string());
    }
    let root = Container::parse(text, &["styles"])?;
    let Some(first) = root.children.first() else {
        return Ok(text.to_string());
    };
    let Some(end) = root.content_end() else {
        return Ok(text.to_string());
    };
    let rewritten = xml::rewrite_fragment(&text[first.range.start..end], refs)?;
    Ok(format!("{}{rewritten}{}", &text[..first.range.start], &text[end..]))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::docx::paragraph_texts;
    use crate::error::Error;
    use crate::docx::test_support::{
        DocxBuilder, SECT_PR, numbered_paragraph, numbering_xml, paragraph, styles_xml,
    };

    fn document(bytes: &[u8]) -> String {
        DocxPackage::from_bytes(bytes).unwrap().document_xml().unwrap()
    }

    fn part(bytes: &[u8], name: &str) -> String {
        DocxPackage::from_bytes(bytes).unwrap().part_text(name).unwrap()
    }

    #[test]
    fn test_without_appendix_returns_main_unchanged() {
        let main = DocxBuilder::new().body(&paragraph("Main")).build();
        assert_eq!(compose(&main, None).unwrap(), main);
    }

    #[test]
    fn test_unreadable_inputs_are_rejected() {
        let main = DocxBuilder::new().body(&paragraph("Main")).build();
        assert!(matches!(compose(b"nope", None), Err(Error::MalformedDocument(_))));
        assert!(matches!(compose(&main, Some(b"nope")), Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn test_appendix_follows_page_break() {
        let main = DocxBuilder::new()
            .body(&paragraph("Main one"))
            .body(&paragraph("Main two"))
            .body(SECT_PR)
            .build();
        let appendix = DocxBuilder::new()
            .body(&paragraph("Appendix one"))
            .body(r#"<w:sectPr><w:pgSz w:w="1" w:h="1"/></w:sectPr>"#)
            .build();

        let output = compose(&main, Some(&appendix)).unwrap();
        let texts = paragraph_texts(&output).unwrap();
        assert_eq!(texts, ["Main one", "Main two", "", "Appendix one"]);

        let xml = document(&output);
        assert!(xml.contains(r#"<w:br w:type="page"/>"#));
        // Main's section properties stay last and the appendix's are dropped
        assert!(xml.ends_with(&format!("{SECT_PR}</w:body></w:document>")));
        assert!(!xml.contains(r#"w:w="1""#));
    }

    #[test]
    fn test_appendix_section_adopted_when_main_has_none() {
        let main = DocxBuilder::new().body(&paragraph("Main")).build();
        let appendix = DocxBuilder::new().body(&paragraph("Appendix")).body(SECT_PR).build();

        let xml = document(&compose(&main, Some(&appendix)).unwrap());
        assert!(xml.ends_with(&format!("{SECT_PR}</w:body></w:document>")));
        assert_eq!(xml.matches("<w:sectPr>").count(), 1);
    }

    #[test]
    fn test_missing_styles_are_carried_over() {
        let main = DocxBuilder::new()
            .body(&paragraph("Main"))
            .styles(styles_xml(&["Normal", "Heading1"]))
            .build();
        let appendix = DocxBuilder::new()
            .body(&paragraph("Appendix"))
            .styles(styles_xml(&["Normal", "SyllabusTitle"]))
            .build();

        let output = compose(&main, Some(&appendix)).unwrap();
        let styles = part(&output, "word/styles.xml");
        assert_eq!(styles.matches(r#"w:styleId="Normal""#).count(), 1);
        assert!(styles.contains(r#"w:styleId="Heading1""#));
        assert!(styles.contains(r#"w:styleId="SyllabusTitle""#));
    }

    #[test]
    fn test_numbering_ids_are_offset() {
        let main = DocxBuilder::new()
            .body(&numbered_paragraph("Main item", 1))
            .numbering(numbering_xml(&[(0, 1), (1, 2)]))
            .build();
        let appendix = DocxBuilder::new()
            .body(&numbered_paragraph("Appendix item", 1))
            .numbering(numbering_xml(&[(0, 1)]))
            .build();

        let output = compose(&main, Some(&appendix)).unwrap();
        let numbering = part(&output, "word/numbering.xml");
        assert!(numbering.contains(r#"w:abstractNumId="2""#));
        assert!(numbering.contains(r#"<w:num w:numId="3"><w:abstractNumId w:val="2"/></w:num>"#));
        // Abstract definitions stay ahead of instances
        let last_abstract = numbering.rfind("<w:abstractNum ").unwrap();
        let first_num = numbering.find("<w:num ").unwrap();
        assert!(last_abstract < first_num);

        let xml = document(&output);
        assert!(xml.contains(r#"<w:numId w:val="1"/></w:numPr></w:pPr><w:r><w:t>Main item"#));
        assert!(xml.contains(r#"<w:numId w:val="3"/></w:numPr></w:pPr><w:r><w:t>Appendix item"#));
    }

    #[test]
    fn test_numbering_part_adopted_when_main_has_none() {
        let main = DocxBuilder::new().body(&paragraph("Main")).build();
        let appendix = DocxBuilder::new()
            .body(&numbered_paragraph("Item", 1))
            .numbering(numbering_xml(&[(0, 1)]))
            .build();

        let output = compose(&main, Some(&appendix)).unwrap();
        let package = DocxPackage::from_bytes(&output).unwrap();
        let (_, numbering) = package
            .related_part("word/document.xml", REL_NUMBERING)
            .unwrap()
            .unwrap();
        assert_eq!(numbering, "word/numbering.xml");
        assert!(package.part_text("[Content_Types].xml").unwrap().contains("/word/numbering.xml"));
        assert!(document(&output).contains(r#"<w:numId w:val="1"/>"#));
    }

    #[test]
    fn test_images_and_hyperlinks_are_relinked() {
        let main = DocxBuilder::new()
            .body(&paragraph("Main"))
            .relationship("rId1", "image", "media/image1.png", false)
            .part("word/media/image1.png", b"main image")
            .build();
        let appendix = DocxBuilder::new()
            .body(r#"<w:p><w:r><w:drawing><a:blip xmlns:a="urn:a" r:embed="rId1"/></w:drawing></w:r></w:p>"#)
            .body(r#"<w:p><w:hyperlink r:id="rId2"><w:r><w:t>Link</w:t></w:r></w:hyperlink></w:p>"#)
            .relationship("rId1", "image", "media/image1.png", false)
            .relationship("rId2", "hyperlink", "https://example.edu/syllabus", true)
            .relationship("rId3", "footer", "footer1.xml", false)
            .part("word/media/image1.png", b"appendix image")
            .build();

        let output = compose(&main, Some(&appendix)).unwrap();
        let package = DocxPackage::from_bytes(&output).unwrap();
        assert_eq!(package.part("word/media/image1.png").unwrap(), b"main image");
        assert_eq!(package.part("word/media/appendix1_image1.png").unwrap(), b"appendix image");

        let rels = package.relationships("word/document.xml").unwrap();
        let image = rels.iter().find(|r| r.target == "media/appendix1_image1.png").unwrap();
        let link = rels.iter().find(|r| r.target == "https://example.edu/syllabus").unwrap();
        assert!(link.external);
        assert!(!rels.iter().any(|r| r.target == "footer1.xml"));

        let xml = document(&output);
        assert!(xml.contains(&format!(r#"r:embed="{}""#, image.id)));
        assert!(xml.contains(&format!(r#"r:id="{}""#, link.id)));
        assert!(package.part_text("[Content_Types].xml").unwrap().contains(r#"Extension="png""#));
    }

    #[test]
    fn test_uncarried_references_do_not_reach_main_relationships() {
        let main = DocxBuilder::new()
            .body(&paragraph("Main"))
            .relationship("rId1", "image", "media/image1.png", false)
            .part("word/media/image1.png", b"main image")
            .build();
        let chart = concat!(
            r#"<w:p><w:r><w:drawing><wp:inline xmlns:wp="urn:wp"><a:graphic xmlns:a="urn:a">"#,
            r#"<a:graphicData><c:chart xmlns:c="urn:c" r:id="rId1"/></a:graphicData>"#,
            r#"</a:graphic></wp:inline></w:drawing></w:r></w:p>"#,
        );
        let appendix = DocxBuilder::new()
            .body(chart)
            .body(r#"<w:p><w:r><w:t>Cited</w:t></w:r><w:r><w:footnoteReference w:id="7"/></w:r></w:p>"#)
            .relationship("rId1", "chart", "charts/chart1.xml", false)
            .relationship("rId2", "footnotes", "footnotes.xml", false)
            .part("word/charts/chart1.xml", b"<c:chartSpace/>")
            .build();

        let output = compose(&main, Some(&appendix)).unwrap();
        let xml = document(&output);
        assert!(!xml.contains("chart"));
        assert!(!xml.contains("r:id="));
        assert!(!xml.contains("footnoteReference"));
        assert_eq!(paragraph_texts(&output).unwrap(), ["Main", "", "", "Cited"]);

        let package = DocxPackage::from_bytes(&output).unwrap();
        let rels = package.relationships("word/document.xml").unwrap();
        assert_eq!(rels.len(), 1);
        assert!(rels[0].is_type(REL_IMAGE));
    }

    #[test]
    fn test_composer_appends_several_documents() {
        let main = DocxBuilder::new().body(&paragraph("Main")).body(SECT_PR).build();
        let first = DocxBuilder::new().body(&paragraph("First")).build();
        let second = DocxBuilder::new().body(&paragraph("Second")).build();

        let mut composer = Composer::new(&main).unwrap();
        composer.append(&first).unwrap();
        composer.append(&second).unwrap();
        assert_eq!(composer.appended(), 2);

        let texts = paragraph_texts(&composer.finish().unwrap()).unwrap();
        assert_eq!(texts, ["Main", "", "First", "", "Second"]);
    }
}
