//! Byte-offset view over WordprocessingML parts.
//!
//! Parts are never rebuilt from a tree. [`Container::parse`] records where an
//! element's direct children sit in the original text, and edits splice new
//! markup in at those offsets, so everything untouched is kept byte-for-byte.
//! Elements are matched on local name; the prefix a producer picked is ignored.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};

/// Path from the root to the `w:body` element of a main document part.
pub const BODY_PATH: &[&str] = &["document", "body"];

fn malformed(reason: impl std::fmt::Display) -> Error {
    Error::MalformedDocument(reason.to_string())
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    e.attributes()
        .map(|attr| {
            let attr = attr.map_err(malformed)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(malformed)?.into_owned();
            Ok((key, value))
        })
        .collect()
}

/// A direct child of a [`Container`].
#[derive(Debug, Clone)]
pub struct Element {
    pub local_name: String,
    /// Qualified attribute names with unescaped values
    pub attributes: Vec<(String, String)>,
    /// Byte range of the whole element, tags included
    pub range: Range<usize>,
    /// Concatenated text of descendant `t` elements
    pub text: String,
}

impl Element {
    /// Attribute value by local name (`styleId` matches `w:styleId`).
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find_map(|(key, value)| {
            let local = key.rsplit(':').next().unwrap_or(key);
            (local == name).then_some(value.as_str())
        })
    }

    pub fn is(&self, name: &str) -> bool {
        self.local_name == name
    }
}

/// An element located by path, with its direct children.
#[derive(Debug)]
pub struct Container {
    /// Qualified element name, used when a self-closing tag must be expanded
    name: String,
    /// Start tag, or the whole tag when self-closing
    tag: Range<usize>,
    /// Range between the start and end tags; `None` when self-closing
    content: Option<Range<usize>>,
    pub children: Vec<Element>,
}

impl Container {
    /// Locate the first element at `path` (local names from the root) and
    /// index its direct children.
    pub fn parse(xml: &str, path: &[&str]) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<String> = Vec::new();
        let mut found: Option<Self> = None;
        let mut current: Option<Element> = None;
        let mut text_depth = 0usize;
        let mut closed = false;

        let at_path = |stack: &[String], len: usize| {
            stack.len() == len && stack.iter().zip(path).all(|(a, b)| a == b)
        };

        loop {
            let pos = reader.buffer_position();
            let event = reader
                .read_event()
                .map_err(|e| malformed(format!("invalid XML near byte {pos}: {e}")))?;

            match event {
                Event::Start(e) => {
                    let name = local_name(&e);
                    if found.is_none() {
                        if at_path(&stack, path.len() - 1) && name == path[path.len() - 1] {
                            let end = reader.buffer_position();
                            found = Some(Self {
                                name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                                tag: pos..end,
                                content: Some(end..end),
                                children: Vec::new(),
                            });
                        }
                    } else if at_path(&stack, path.len()) {
                        current = Some(Element {
                            attributes: attributes(&e)?,
                            local_name: name.clone(),
                            range: pos..pos,
                            text: String::new(),
                        });
                    } else if name == "t" && current.is_some() {
                        text_depth += 1;
                    }
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = local_name(&e);
                    let end = reader.buffer_position();
                    if found.is_none() {
                        if at_path(&stack, path.len() - 1) && name == path[path.len() - 1] {
                            found = Some(Self {
                                name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                                tag: pos..end,
                                content: None,
                                children: Vec::new(),
                            });
                            break;
                        }
                    } else if at_path(&stack, path.len()) {
                        if let Some(container) = found.as_mut() {
                            container.children.push(Element {
                                attributes: attributes(&e)?,
                                local_name: name,
                                range: pos..end,
                                text: String::new(),
                            });
                        }
                    }
                }
                Event::Text(t) => {
                    if text_depth > 0 {
                        if let Some(element) = current.as_mut() {
                            element.text.push_str(&t.unescape().map_err(malformed)?);
                        }
                    }
                }
                Event::End(_) => {
                    let name = stack.pop().unwrap_or_default();
                    let Some(container) = found.as_mut() else {
                        continue;
                    };
                    if at_path(&stack, path.len()) {
                        if let Some(mut element) = current.take() {
                            element.range.end = reader.buffer_position();
                            container.children.push(element);
                        }
                    } else if at_path(&stack, path.len() - 1) && name == path[path.len() - 1] {
                        if let Some(content) = container.content.as_mut() {
                            content.end = pos;
                        }
                        closed = true;
                        break;
                    } else if name == "t" && text_depth > 0 {
                        text_depth -= 1;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        match found {
            Some(container) if closed || container.content.is_none() => Ok(container),
            Some(_) => Err(malformed(format!("<{}> is never closed", path.join("/")))),
            None => Err(malformed(format!("missing <{}> element", path.join("/")))),
        }
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    /// Whether the container was written as `<x/>`.
    pub const fn is_self_closing(&self) -> bool {
        self.content.is_none()
    }

    /// Offset just before the end tag.
    pub fn content_end(&self) -> Option<usize> {
        self.content.as_ref().map(|c| c.end)
    }

    /// Insert `fragment` as the last children.
    pub fn append(&self, xml: &str, fragment: &str) -> String {
        match &self.content {
            Some(content) => splice(xml, content.end, fragment),
            None => {
                let tag = &xml[self.tag.clone()];
                let open = tag.strip_suffix("/>").unwrap_or(tag).trim_end();
                let mut out = String::with_capacity(xml.len() + fragment.len() + self.name.len() + 3);
                out.push_str(&xml[..self.tag.start]);
                out.push_str(open);
                out.push('>');
                out.push_str(fragment);
                out.push_str("</");
                out.push_str(&self.name);
                out.push('>');
                out.push_str(&xml[self.tag.end..]);
                out
            }
        }
    }

    /// Insert `fragment` before the first child named in `names`, or append it.
    pub fn insert_before_first(&self, xml: &str, names: &[&str], fragment: &str) -> String {
        self.children
            .iter()
            .find(|c| names.contains(&c.local_name.as_str()))
            .map_or_else(|| self.append(xml, fragment), |c| splice(xml, c.range.start, fragment))
    }

    /// Concatenated source text of the children matching `keep`.
    pub fn children_source(&self, xml: &str, keep: impl Fn(&Element) -> bool) -> String {
        self.children
            .iter()
            .filter(|c| keep(c))
            .map(|c| &xml[c.range.clone()])
            .collect()
    }
}

/// Insert `fragment` into `xml` at byte offset `at`.
pub fn splice(xml: &str, at: usize, fragment: &str) -> String {
    let mut out = String::with_capacity(xml.len() + fragment.len());
    out.push_str(&xml[..at]);
    out.push_str(fragment);
    out.push_str(&xml[at..]);
    out
}

/// Escape text for use in element content or attribute values.
pub fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

fn is_namespace_declaration(key: &str) -> bool {
    key == "xmlns" || key.starts_with("xmlns:")
}

/// Namespace declarations on the root element.
pub fn root_namespaces(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(attributes(&e)?
                    .into_iter()
                    .filter(|(key, _)| is_namespace_declaration(key))
                    .collect());
            }
            Event::Eof => return Err(malformed("no root element")),
            _ => {}
        }
    }
}

/// Add each declaration from `namespaces` whose prefix the root element does
/// not declare yet.
pub fn declare_namespaces(xml: &str, namespaces: &[(String, String)]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        let pos = reader.buffer_position();
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) => {
                let existing = attributes(&e)?;
                let missing: String = namespaces
                    .iter()
                    .filter(|(key, _)| !existing.iter().any(|(k, _)| k == key))
                    .map(|(key, uri)| format!(r#" {key}="{}""#, escape(uri)))
                    .collect();
                if missing.is_empty() {
                    return Ok(xml.to_string());
                }
                let end = reader.buffer_position();
                let close = if xml[pos..end].ends_with("/>") { end - 2 } else { end - 1 };
                return Ok(splice(xml, close, &missing));
            }
            Event::Eof => return Err(malformed("no root element")),
            _ => {}
        }
    }
}

/// Relationship ids referenced anywhere in `fragment` through `r:` attributes.
pub fn relationship_refs(fragment: &str) -> Result<BTreeSet<String>> {
    let mut reader = Reader::from_str(fragment);
    let mut refs = BTreeSet::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) => {
                for (key, value) in attributes(&e)? {
                    if key.starts_with("r:") {
                        refs.insert(value);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(refs)
}

/// Identifier remapping applied to markup moved between packages.
#[derive(Debug, Default)]
pub struct ReferenceMap {
    /// Old relationship id to new relationship id
    pub relationships: HashMap<String, String>,
    /// Added to every non-zero `numId`
    pub num_id_offset: u32,
    /// Added to every `abstractNumId`
    pub abstract_num_offset: u32,
}

impl ReferenceMap {
    fn replacement(&self, element: &str, key: &str, value: &str) -> Option<String> {
        let local = key.rsplit(':').next().unwrap_or(key);
        let shift = |offset: u32, skip_zero: bool| {
            let n: u32 = value.parse().ok()?;
            (offset > 0 && !(skip_zero && n == 0)).then(|| (n + offset).to_string())
        };

        if key.starts_with("r:") {
            return self.relationships.get(value).cloned();
        }
        match (element, local) {
            ("numId", "val") | ("num", "numId") => shift(self.num_id_offset, true),
            ("abstractNumId", "val") | ("abstractNum", "abstractNumId") => {
                shift(self.abstract_num_offset, false)
            }
            _ => None,
        }
    }

    fn resolves(&self, key: &str, value: &str) -> bool {
        !key.starts_with("r:") || self.relationships.contains_key(value)
    }

    fn rewrite_start(&self, e: &BytesStart<'_>) -> Result<Option<BytesStart<'static>>> {
        let element = local_name(e);
        let mut attrs = attributes(e)?;
        let before = attrs.len();
        // A hyperlink without a target still keeps its text
        if element == "hyperlink" {
            attrs.retain(|(key, value)| self.resolves(key, value));
        }
        let mut changed = attrs.len() != before;
        for (key, value) in &mut attrs {
            if let Some(new) = self.replacement(&element, key, value) {
                *value = new;
                changed = true;
            }
        }
        if !changed {
            return Ok(None);
        }

        let mut rewritten = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
        for (key, value) in &attrs {
            rewritten.push_attribute((key.as_str(), value.as_str()));
        }
        Ok(Some(rewritten))
    }
}

/// Header, footer, note and comment parts are not carried between packages,
/// so references to them are removed instead of left dangling.
fn is_dropped(name: &str) -> bool {
    matches!(
        name,
        "headerReference"
            | "footerReference"
            | "footnoteReference"
            | "endnoteReference"
            | "commentReference"
            | "commentRangeStart"
            | "commentRangeEnd"
    )
}

/// Elements that embed a related part and are removed as a whole when that
/// part is not carried over.
fn is_embedded_object(name: &str) -> bool {
    matches!(name, "AlternateContent" | "drawing" | "object" | "pict")
}

/// Start offsets of elements to remove because a relationship they reference
/// has no entry in `refs`. A reference inside an embedded object removes the
/// outermost enclosing object.
fn unresolved_elements(fragment: &str, refs: &ReferenceMap) -> Result<HashSet<usize>> {
    let mut reader = Reader::from_str(fragment);
    let mut open: Vec<(String, usize)> = Vec::new();
    let mut unresolved = HashSet::new();

    loop {
        let pos = reader.buffer_position();
        let (e, empty) = match reader.read_event().map_err(malformed)? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(_) => {
                open.pop();
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let name = local_name(&e);
        if name != "hyperlink"
            && attributes(&e)?
                .iter()
                .any(|(key, value)| !refs.resolves(key, value))
        {
            let start = open
                .iter()
                .find(|(n, _)| is_embedded_object(n))
                .map_or(pos, |(_, start)| *start);
            unresolved.insert(start);
        }
        if !empty {
            open.push((name, pos));
        }
    }
    Ok(unresolved)
}

/// Re-emit `fragment` with ids remapped through `refs`.
///
/// References to parts that were not carried over are removed along with the
/// element (or embedded object) holding them.
pub fn rewrite_fragment(fragment: &str, refs: &ReferenceMap) -> Result<String> {
    let unresolved = unresolved_elements(fragment, refs)?;
    let mut reader = Reader::from_str(fragment);
    let mut writer = Writer::new(Vec::with_capacity(fragment.len()));
    let mut skip_depth = 0usize;

    loop {
        let pos = reader.buffer_position();
        let event = reader.read_event().map_err(malformed)?;
        let write = match event {
            Event::Eof => break,
            Event::Start(e) => {
                if skip_depth > 0 || is_dropped(&local_name(&e)) || unresolved.contains(&pos) {
                    skip_depth += 1;
                    continue;
                }
                match refs.rewrite_start(&e)? {
                    Some(rewritten) => writer.write_event(Event::Start(rewritten)),
                    None => writer.write_event(Event::Start(e)),
                }
            }
            Event::Empty(e) => {
                if skip_depth > 0 || is_dropped(&local_name(&e)) || unresolved.contains(&pos) {
                    continue;
                }
                match refs.rewrite_start(&e)? {
                    Some(rewritten) => writer.write_event(Event::Empty(rewritten)),
                    None => writer.write_event(Event::Empty(e)),
                }
            }
            Event::End(e) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                writer.write_event(Event::End(e))
            }
            other => {
                if skip_depth > 0 {
                    continue;
                }
                writer.write_event(other)
            }
        };
        write.map_err(|e| malformed(format!("failed to rewrite markup: {e}")))?;
    }

    String::from_utf8(writer.into_inner()).map_err(malformed)
}
