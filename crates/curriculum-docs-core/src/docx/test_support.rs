//! In-memory DOCX fixtures for unit tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub fn paragraph(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
}

pub fn numbered_paragraph(text: &str, num_id: u32) -> String {
    format!(
        r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="{num_id}"/></w:numPr></w:pPr><w:r><w:t>{text}</w:t></w:r></w:p>"#
    )
}

pub const SECT_PR: &str = r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440"/></w:sectPr>"#;

pub fn styles_xml(style_ids: &[&str]) -> String {
    let styles: String = style_ids
        .iter()
        .map(|id| format!(r#"<w:style w:type="paragraph" w:styleId="{id}"><w:name w:val="{id}"/></w:style>"#))
        .collect();
    format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:styles xmlns:w="{W_NS}">{styles}</w:styles>"#)
}

/// Numbering part with one abstract definition and one instance per id pair
pub fn numbering_xml(ids: &[(u32, u32)]) -> String {
    let abstracts: String = ids
        .iter()
        .map(|(abs, _)| {
            format!(r#"<w:abstractNum w:abstractNumId="{abs}"><w:lvl w:ilvl="0"><w:numFmt w:val="decimal"/></w:lvl></w:abstractNum>"#)
        })
        .collect();
    let nums: String = ids
        .iter()
        .map(|(abs, num)| format!(r#"<w:num w:numId="{num}"><w:abstractNumId w:val="{abs}"/></w:num>"#))
        .collect();
    format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:numbering xmlns:w="{W_NS}">{abstracts}{nums}</w:numbering>"#)
}

/// Builder for minimal but well-formed DOCX packages
pub struct DocxBuilder {
    main_part: String,
    body: String,
    styles: Option<String>,
    numbering: Option<String>,
    relationships: Vec<(String, String, String, bool)>,
    parts: Vec<(String, Vec<u8>)>,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self {
            main_part: "word/document.xml".to_string(),
            body: String::new(),
            styles: None,
            numbering: None,
            relationships: Vec::new(),
            parts: Vec::new(),
        }
    }

    pub fn main_part(mut self, name: &str) -> Self {
        self.main_part = name.to_string();
        self
    }

    pub fn body(mut self, xml: &str) -> Self {
        self.body.push_str(xml);
        self
    }

    pub fn styles(mut self, xml: String) -> Self {
        self.styles = Some(xml);
        self
    }

    pub fn numbering(mut self, xml: String) -> Self {
        self.numbering = Some(xml);
        self
    }

    pub fn relationship(mut self, id: &str, kind: &str, target: &str, external: bool) -> Self {
        self.relationships
            .push((id.to_string(), format!("{REL_NS}/{kind}"), target.to_string(), external));
        self
    }

    pub fn part(mut self, name: &str, data: &[u8]) -> Self {
        self.parts.push((name.to_string(), data.to_vec()));
        self
    }

    pub fn document_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}" xmlns:r="{REL_NS}"><w:body>{}</w:body></w:document>"#,
            self.body
        )
    }

    #[allow(clippy::unwrap_used)]
    pub fn build(self) -> Vec<u8> {
        let mut overrides = format!(
            r#"<Override PartName="/{}" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
            self.main_part
        );
        let mut rels = String::new();
        if self.styles.is_some() {
            overrides.push_str(r#"<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>"#);
            rels.push_str(&format!(r#"<Relationship Id="rIdStyles" Type="{REL_NS}/styles" Target="styles.xml"/>"#));
        }
        if self.numbering.is_some() {
            overrides.push_str(r#"<Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/>"#);
            rels.push_str(&format!(r#"<Relationship Id="rIdNumbering" Type="{REL_NS}/numbering" Target="numbering.xml"/>"#));
        }
        for (id, kind, target, external) in &self.relationships {
            let mode = if *external { r#" TargetMode="External""# } else { "" };
            rels.push_str(&format!(r#"<Relationship Id="{id}" Type="{kind}" Target="{target}"{mode}/>"#));
        }

        let content_types = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{overrides}</Types>"#
        );
        let package_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="{}"/></Relationships>"#,
            self.main_part
        );
        let document_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        );
        let (dir, file) = self.main_part.rsplit_once('/').unwrap();

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        let mut add = |name: &str, data: &[u8]| {
            writer.start_file(name, options).unwrap();
            writer.write_all(data).unwrap();
        };

        add("[Content_Types].xml", content_types.as_bytes());
        add("_rels/.rels", package_rels.as_bytes());
        add(&self.main_part, self.document_xml().as_bytes());
        add(&format!("{dir}/_rels/{file}.rels"), document_rels.as_bytes());
        if let Some(styles) = &self.styles {
            add("word/styles.xml", styles.as_bytes());
        }
        if let Some(numbering) = &self.numbering {
            add("word/numbering.xml", numbering.as_bytes());
        }
        for (name, data) in &self.parts {
            add(name, data);
        }

        writer.finish().unwrap().into_inner()
    }
}
