//! In-memory PDF document.
//!
//! [`PdfDocument::load`] reads a complete file into an arena of indirect
//! objects keyed by object number. Cross-reference streams and object streams
//! are consumed during loading and not kept: object stream members become
//! ordinary arena entries, and the writer emits a fresh classic xref table.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::{parse_indirect_object, to_parse_error};
use crate::xref::{find_xref_offset, parse_xref, CrossRefTable, XRefEntry};
use crate::xref_reconstruction::reconstruct_xref;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Maximum depth followed through the page tree or a reference chain.
const MAX_TREE_DEPTH: usize = 64;

static NULL: Object = Object::Null;

/// A parsed PDF held entirely in memory.
///
/// # Example
///
/// ```no_run
/// use pdf_signing::document::PdfDocument;
///
/// let bytes = std::fs::read("contract.pdf")?;
/// let doc = PdfDocument::load(&bytes)?;
/// let page = doc.first_page_ref()?;
/// println!("first page is {}", page);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct PdfDocument {
    version: (u8, u8),
    objects: BTreeMap<u32, (u16, Object)>,
    trailer: Dictionary,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("objects", &self.objects.len())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Parse a PDF from bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHeader`] if the data does not start with `%PDF-M.m`
    /// - [`Error::InvalidXref`] / [`Error::InvalidPdf`] if no cross-reference
    ///   data can be found or rebuilt, or the catalog is missing
    /// - [`Error::Unsupported`] for encrypted documents
    pub fn load(data: &[u8]) -> Result<Self> {
        let version = parse_header(data)?;

        let xref = match open_xref(data) {
            Ok(xref) if !xref.is_empty() => xref,
            Ok(_) => {
                log::warn!("Cross-reference table is empty, attempting reconstruction");
                reconstruct_xref(data)?
            },
            Err(e) => {
                log::warn!("Regular xref parsing failed: {}, attempting reconstruction", e);
                reconstruct_xref(data).map_err(|recon_err| {
                    log::error!("XRef reconstruction also failed: {}", recon_err);
                    e
                })?
            },
        };

        if xref.trailer().contains_key("Encrypt") {
            return Err(Error::Unsupported("encrypted documents cannot be signed".to_string()));
        }

        let mut loader = ObjectLoader {
            data,
            xref: &xref,
            fallback: None,
        };
        let objects = loader.load_all();

        let mut trailer = xref.trailer().clone();
        for key in ["Prev", "XRefStm", "Type", "W", "Index", "Filter", "DecodeParms", "Length"] {
            trailer.remove(key);
        }

        let doc = Self {
            version,
            objects,
            trailer,
        };

        let root = doc.catalog_ref()?;
        if !doc.get(root).is_some_and(|catalog| catalog.as_dict().is_some()) {
            return Err(Error::InvalidPdf(format!("catalog {} is missing or not a dictionary", root)));
        }

        log::debug!(
            "Loaded PDF {}.{} with {} objects",
            version.0,
            version.1,
            doc.objects.len()
        );
        Ok(doc)
    }

    /// PDF version from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Trailer dictionary (without xref bookkeeping keys).
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Number of indirect objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the document holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Look up an indirect object. A generation mismatch is treated as missing.
    pub fn get(&self, obj_ref: ObjectRef) -> Option<&Object> {
        match self.objects.get(&obj_ref.id) {
            Some((gen, obj)) if *gen == obj_ref.gen => Some(obj),
            _ => None,
        }
    }

    /// Mutable lookup of an indirect object.
    pub fn get_mut(&mut self, obj_ref: ObjectRef) -> Option<&mut Object> {
        match self.objects.get_mut(&obj_ref.id) {
            Some((gen, obj)) if *gen == obj_ref.gen => Some(obj),
            _ => None,
        }
    }

    /// Follow references until a direct object is reached.
    ///
    /// Dangling references resolve to `null`, as the PDF format prescribes.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        let mut current = obj;
        for _ in 0..MAX_TREE_DEPTH {
            match current {
                Object::Reference(r) => match self.get(*r) {
                    Some(next) => current = next,
                    None => return &NULL,
                },
                direct => return direct,
            }
        }
        log::warn!("Reference chain deeper than {}, treating as null", MAX_TREE_DEPTH);
        &NULL
    }

    /// Register a new indirect object under the next free object number.
    pub fn add_object(&mut self, obj: Object) -> ObjectRef {
        let id = self.max_object_number() + 1;
        self.objects.insert(id, (0, obj));
        ObjectRef::new(id, 0)
    }

    /// Insert or replace an indirect object.
    pub fn set_object(&mut self, obj_ref: ObjectRef, obj: Object) {
        self.objects.insert(obj_ref.id, (obj_ref.gen, obj));
    }

    /// Highest object number in use (0 for an empty document).
    pub fn max_object_number(&self) -> u32 {
        self.objects.keys().next_back().copied().unwrap_or(0)
    }

    /// Iterate over all indirect objects in ascending object-number order.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectRef, &Object)> {
        self.objects
            .iter()
            .map(|(id, (gen, obj))| (ObjectRef::new(*id, *gen), obj))
    }

    /// Reference to the document catalog (`/Root`).
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("trailer missing /Root reference".to_string()))
    }

    /// Reference to the first leaf `/Page` of the page tree.
    ///
    /// Walks `/Pages` → `/Kids[0]` until a page is reached.
    pub fn first_page_ref(&self) -> Result<ObjectRef> {
        let catalog = self
            .get(self.catalog_ref()?)
            .ok_or_else(|| Error::InvalidPdf("catalog object missing".to_string()))?;
        let mut node_ref = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("Catalog missing /Pages entry".to_string()))?;

        let mut visited = HashSet::new();
        for _ in 0..MAX_TREE_DEPTH {
            if !visited.insert(node_ref) {
                return Err(Error::InvalidPdf(format!("page tree cycle at {}", node_ref)));
            }
            let node = self
                .get(node_ref)
                .ok_or(Error::ObjectNotFound(node_ref.id, node_ref.gen))?;

            let kids = node.get("Kids").map(|k| self.resolve(k));
            let is_page = node.has_type("Page") || (kids.is_none() && !node.has_type("Pages"));
            if is_page {
                return Ok(node_ref);
            }

            node_ref = kids
                .and_then(Object::as_array)
                .and_then(|kids| kids.first())
                .and_then(Object::as_reference)
                .ok_or_else(|| Error::InvalidPdf("document has no pages".to_string()))?;
        }

        Err(Error::InvalidPdf(format!(
            "page tree deeper than {} levels",
            MAX_TREE_DEPTH
        )))
    }
}

/// Parse the `%PDF-M.m` header.
///
/// Producers sometimes put junk before the header; up to 1 KB is tolerated.
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(1024)];
    let start = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            Error::InvalidHeader(format!(
                "expected '%PDF-', found '{}'",
                String::from_utf8_lossy(&data[..data.len().min(8)])
            ))
        })?;
    if start > 0 {
        log::warn!("PDF header found at offset {} instead of 0", start);
    }

    let version = data.get(start + 5..start + 8).unwrap_or_default();
    match version {
        [major @ b'0'..=b'9', b'.', minor @ b'0'..=b'9'] => Ok((major - b'0', minor - b'0')),
        _ => Err(Error::InvalidHeader(format!(
            "invalid version '{}'",
            String::from_utf8_lossy(version)
        ))),
    }
}

fn open_xref(data: &[u8]) -> Result<CrossRefTable> {
    let offset = find_xref_offset(data)?;
    parse_xref(data, offset)
}

/// Pulls every live object out of the file, falling back to a scanned xref
/// for objects whose recorded offset is wrong.
struct ObjectLoader<'a> {
    data: &'a [u8],
    xref: &'a CrossRefTable,
    fallback: Option<CrossRefTable>,
}

impl ObjectLoader<'_> {
    fn load_all(&mut self) -> BTreeMap<u32, (u16, Object)> {
        let mut objects = BTreeMap::new();
        let mut compressed: HashMap<u32, Vec<u32>> = HashMap::new();

        let mut entries: Vec<(u32, XRefEntry)> = self.xref.entries().collect();
        entries.sort_by_key(|(id, _)| *id);

        for (id, entry) in entries {
            match entry {
                XRefEntry::Free => {},
                XRefEntry::Uncompressed { offset, gen } => match self.load_uncompressed(id, gen, offset) {
                    Ok(obj) => {
                        objects.insert(id, (gen, obj));
                    },
                    Err(e) => log::warn!("Skipping object {} {}: {}", id, gen, e),
                },
                XRefEntry::Compressed { stream, .. } => compressed.entry(stream).or_default().push(id),
            }
        }

        for (stream_id, members) in compressed {
            let stream = match objects.get(&stream_id) {
                Some((_, obj)) => obj.clone(),
                None => {
                    log::warn!("Object stream {} not found, skipping {} objects", stream_id, members.len());
                    continue;
                },
            };
            match parse_object_stream(&stream) {
                Ok(mut parsed) => {
                    for id in members {
                        match parsed.remove(&id) {
                            Some(obj) => {
                                objects.insert(id, (0, obj));
                            },
                            None => log::warn!("Object {} missing from object stream {}", id, stream_id),
                        }
                    }
                },
                Err(e) => log::warn!("Failed to read object stream {}: {}", stream_id, e),
            }
        }

        objects.retain(|_, (_, obj)| !(obj.has_type("XRef") || obj.has_type("ObjStm")));
        objects
    }

    fn load_uncompressed(&mut self, id: u32, gen: u16, offset: usize) -> Result<Object> {
        match self.parse_at(id, offset) {
            Ok(obj) => Ok(obj),
            Err(first_err) => {
                let relocated = self.fallback_table().and_then(|table| match table.get(id) {
                    Some(XRefEntry::Uncompressed { offset: found, .. }) if *found != offset => Some(*found),
                    _ => None,
                });
                match relocated {
                    Some(found) => {
                        log::info!("Object {} {} relocated from {} to {}", id, gen, offset, found);
                        self.parse_at(id, found)
                    },
                    None => Err(first_err),
                }
            },
        }
    }

    fn fallback_table(&mut self) -> Option<&CrossRefTable> {
        if self.fallback.is_none() {
            match reconstruct_xref(self.data) {
                Ok(table) => self.fallback = Some(table),
                Err(e) => {
                    log::debug!("Fallback xref scan failed: {}", e);
                    return None;
                },
            }
        }
        self.fallback.as_ref()
    }

    fn parse_at(&self, id: u32, offset: usize) -> Result<Object> {
        let input = self.data.get(offset..).ok_or_else(|| Error::ParseError {
            offset,
            reason: "object offset beyond end of file".to_string(),
        })?;

        let (_, (found, obj)) =
            parse_indirect_object(input, None).map_err(|e| to_parse_error(input, offset, e))?;
        if found.id != id {
            return Err(Error::ParseError {
                offset,
                reason: format!("expected object {}, found {}", id, found),
            });
        }

        // Streams whose /Length is indirect were read by scanning for
        // `endstream`; re-read them with the real length when it resolves.
        let length_ref = match &obj {
            Object::Stream { dict, .. } => dict.get("Length").and_then(Object::as_reference),
            _ => None,
        };
        if let Some(length) = length_ref.and_then(|r| self.indirect_length(r)) {
            if let Ok((_, (_, exact))) = parse_indirect_object(input, Some(length)) {
                return Ok(exact);
            }
        }

        Ok(obj)
    }

    fn indirect_length(&self, length_ref: ObjectRef) -> Option<usize> {
        let Some(XRefEntry::Uncompressed { offset, .. }) = self.xref.get(length_ref.id) else {
            return None;
        };
        let (_, (_, obj)) = parse_indirect_object(self.data.get(*offset..)?, None).ok()?;
        obj.as_integer().and_then(|len| usize::try_from(len).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"%PDF-1.7\n").unwrap(), (1, 7));
        assert_eq!(parse_header(b"junk\n%PDF-2.0\n").unwrap(), (2, 0));
        assert!(matches!(parse_header(b"GIF89a"), Err(Error::InvalidHeader(_))));
        assert!(matches!(parse_header(b"%PDF-x.y"), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_load_rejects_non_pdf() {
        assert!(PdfDocument::load(b"hello world").is_err());
    }
}
