use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{Error, Result};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in damaged files
const MAX_TREE_DEPTH: usize = 64;

/// Trait for PDF concatenation backends
pub trait PdfMerger: Send + Sync {
    fn name(&self) -> &'static str;

    /// Concatenate `pdfs` into one document, pages in input order.
    fn merge(&self, pdfs: &[Vec<u8>]) -> Result<Vec<u8>>;
}

/// Page-tree concatenation with `lopdf`
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfMerger;

impl PdfMerger for LopdfMerger {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn merge(&self, pdfs: &[Vec<u8>]) -> Result<Vec<u8>> {
        match pdfs {
            [] => Err(Error::EmptyInput),
            [single] => Ok(single.clone()),
            _ => concatenate(pdfs),
        }
    }
}

/// Number of pages in a PDF
pub fn page_count(pdf: &[u8]) -> Result<usize> {
    let doc = Document::load_mem(pdf)
        .map_err(|e| Error::MergeUnavailable(format!("failed to load PDF: {e}")))?;
    Ok(doc.get_pages().len())
}

fn unavailable(reason: impl std::fmt::Display) -> Error {
    Error::MergeUnavailable(reason.to_string())
}

fn concatenate(pdfs: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut max_id: u32 = 1;
    let mut version = String::from("1.5");
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (i, bytes) in pdfs.iter().enumerate() {
        let mut doc = Document::load_mem(bytes)
            .map_err(|e| unavailable(format!("failed to load PDF {}: {e}", i + 1)))?;

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;
        if doc.version > version {
            version.clone_from(&doc.version);
        }

        // get_pages is keyed by page number, so this keeps each source's order
        for page_id in doc.get_pages().into_values() {
            let page = doc
                .get_dictionary(page_id)
                .map_err(|e| unavailable(format!("PDF {} has an unreadable page: {e}", i + 1)))?
                .clone();
            pages.push((page_id, with_inherited_attributes(&doc, page)));
        }

        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline" => {}
                _ => {
                    objects.insert(object_id, object);
                }
            }
        }
    }

    let mut document = Document::with_version(version);
    document.objects = objects;
    document.max_id = max_id;

    let pages_id = document.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());
    for (page_id, mut page) in pages {
        page.set("Parent", Object::Reference(pages_id));
        document.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    let count = i64::try_from(kids.len()).map_err(unavailable)?;
    let pages_dict = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(count)),
    ]);
    document.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = document.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    document.trailer.set("Root", Object::Reference(catalog_id));

    document.renumber_objects();
    document.compress();

    let mut output = Vec::new();
    document
        .save_to(&mut output)
        .map_err(|e| unavailable(format!("failed to save merged PDF: {e}")))?;

    debug!("Merged {} PDFs ({} pages, {} bytes)", pdfs.len(), count, output.len());
    Ok(output)
}

/// Copy attributes the page inherits from its ancestors onto the page itself,
/// since the intermediate page-tree nodes are not carried over.
fn with_inherited_attributes(doc: &Document, mut page: Dictionary) -> Dictionary {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(node_id) = parent {
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key)
                && let Ok(value) = node.get(key)
            {
                page.set(key, value.clone());
            }
        }

        depth += 1;
        if depth >= MAX_TREE_DEPTH {
            break;
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    page
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lopdf::Stream;
    use lopdf::content::{Content, Operation};

    /// `pages` pages of `width` x 792; the MediaBox lives on the page tree node
    /// when `inherited` is set.
    fn create_test_pdf(pages: usize, width: i64, inherited: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let page_tree_id = doc.new_object_id();
        let media_box = Object::Array(vec![0.into(), 0.into(), width.into(), 792.into()]);

        let font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
        ]));
        let resources_id = doc.add_object(Dictionary::from_iter([(
            "Font",
            Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
        )]));

        let mut kids = Vec::new();
        for n in 0..pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {n}"))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

            let mut page = Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(page_tree_id)),
                ("Contents", Object::Reference(content_id)),
            ]);
            if !inherited {
                page.set("MediaBox", media_box.clone());
                page.set("Resources", Object::Reference(resources_id));
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let mut page_tree = Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(i64::try_from(pages).unwrap())),
            ("Kids", Object::Array(kids)),
        ]);
        if inherited {
            page_tree.set("MediaBox", media_box);
            page_tree.set("Resources", Object::Reference(resources_id));
        }
        doc.objects.insert(page_tree_id, Object::Dictionary(page_tree));

        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(page_tree_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut output = Vec::new();
        doc.save_to(&mut output).unwrap();
        output
    }

    fn page_widths(pdf: &[u8]) -> Vec<i64> {
        let doc = Document::load_mem(pdf).unwrap();
        doc.get_pages()
            .into_values()
            .map(|id| {
                let page = doc.get_dictionary(id).unwrap();
                page.get(b"MediaBox").unwrap().as_array().unwrap()[2].as_i64().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_merge_empty_input() {
        assert!(matches!(LopdfMerger.merge(&[]), Err(Error::EmptyInput)));
    }

    #[test]
    fn test_merge_single_is_unchanged() {
        let pdf = create_test_pdf(2, 612, false);
        assert_eq!(LopdfMerger.merge(std::slice::from_ref(&pdf)).unwrap(), pdf);
    }

    #[test]
    fn test_merge_keeps_input_order() {
        let a = create_test_pdf(2, 612, false);
        let b = create_test_pdf(3, 595, false);

        let merged = LopdfMerger.merge(&[a, b]).unwrap();
        assert_eq!(page_count(&merged).unwrap(), 5);
        assert_eq!(page_widths(&merged), [612, 612, 595, 595, 595]);
    }

    #[test]
    fn test_merge_copies_inherited_attributes() {
        let a = create_test_pdf(1, 500, true);
        let b = create_test_pdf(2, 400, true);

        let merged = LopdfMerger.merge(&[a, b]).unwrap();
        assert_eq!(page_widths(&merged), [500, 400, 400]);

        let doc = Document::load_mem(&merged).unwrap();
        for id in doc.get_pages().into_values() {
            assert!(doc.get_dictionary(id).unwrap().has(b"Resources"));
        }
    }

    #[test]
    fn test_merge_rejects_garbage() {
        let a = create_test_pdf(1, 612, false);
        let err = LopdfMerger.merge(&[a, b"not a pdf".to_vec()]).unwrap_err();
        assert!(matches!(err, Error::MergeUnavailable(_)));
    }
}
