//! Signature placeholder insertion.
//!
//! Adds an unsigned signature dictionary, an invisible widget annotation on
//! the first page and the AcroForm registration, then rewrites the document.
//! The serializer reports where the reserved ByteRange slots and Contents
//! field landed, which is all [`ByteRangeResolver`](super::ByteRangeResolver)
//! needs to finish the job.

use super::types::{
    DEFAULT_REASON, DEFAULT_SIGNATURE_CAPACITY, MAX_SIGNATURE_CAPACITY, SIGNATURE_FILTER, SIGNATURE_SUB_FILTER,
};
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{decode_text_string, encode_text_string, Dictionary, Object, ObjectRef, Reservation};
use crate::writer::{ObjectSerializer, PdfWriter, ReservedSpan};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::ops::Range;

/// Where the reserved signature fields sit in a serialized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderLayout {
    /// Offsets of the three ByteRange sentinels (`a`, `b`, `c`)
    pub byte_range_slots: [usize; 3],
    /// Span of the `<...>` Contents field
    pub contents: Range<usize>,
}

impl PlaceholderLayout {
    /// Build from the spans the writer reported.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedPlaceholder`] unless there are exactly three
    /// ByteRange slots and one Contents field.
    pub fn from_reserved(reserved: &[ReservedSpan]) -> Result<Self> {
        let slots: Vec<usize> = reserved
            .iter()
            .filter(|span| span.reservation == Reservation::ByteRangeSlot)
            .map(|span| span.offset)
            .collect();
        let contents: Vec<Range<usize>> = reserved
            .iter()
            .filter(|span| matches!(span.reservation, Reservation::Contents { .. }))
            .map(|span| span.offset..span.end())
            .collect();

        let byte_range_slots: [usize; 3] = slots.as_slice().try_into().map_err(|_| {
            Error::MalformedPlaceholder(format!("expected 3 ByteRange slots, writer reported {}", slots.len()))
        })?;
        match contents.as_slice() {
            [contents] => Ok(Self {
                byte_range_slots,
                contents: contents.clone(),
            }),
            other => Err(Error::MalformedPlaceholder(format!(
                "expected 1 Contents field, writer reported {}",
                other.len()
            ))),
        }
    }
}

/// Output of [`PlaceholderInserter::insert`].
#[derive(Debug, Clone)]
pub struct PreparedPdf {
    /// Rewritten document with sentinels in place
    pub bytes: Vec<u8>,
    /// Positions of the reserved fields
    pub layout: PlaceholderLayout,
}

/// Compute the `/Reason` text for caller-supplied signer strings.
///
/// - no signers: `"Signed by Documenso"`
/// - one string with line breaks: lines joined with `" || "`
/// - one string containing a period: taken as already formatted
/// - anything else: all strings joined with `" || "`
///
/// Every non-default result is prefixed with `"Signed by: "`.
pub fn reason_for_signers(signers: &[String]) -> String {
    match signers {
        [] => DEFAULT_REASON.to_string(),
        [single] if single.contains('\n') => {
            format!("Signed by: {}", split_lines(single).join(" || "))
        },
        [single] if single.contains('.') => format!("Signed by: {}", single),
        many => format!("Signed by: {}", many.join(" || ")),
    }
}

/// Split on `\n` or `\r\n`, keeping empty lines, including a trailing one.
fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len() - 1;
    for line in &mut lines[..last] {
        let text: &str = line;
        *line = text.strip_suffix('\r').unwrap_or(text);
    }
    lines
}

/// Format a timestamp as a PDF date string (`D:YYYYMMDDHHmmSSZ`).
pub fn pdf_date(time: DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%SZ").to_string()
}

/// Inserts signature placeholders.
#[derive(Debug, Clone)]
pub struct PlaceholderInserter {
    capacity: usize,
    signing_time: Option<DateTime<Utc>>,
}

impl Default for PlaceholderInserter {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceholderInserter {
    /// Inserter reserving [`DEFAULT_SIGNATURE_CAPACITY`] bytes.
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_SIGNATURE_CAPACITY,
            signing_time: None,
        }
    }

    /// Reserve `capacity` raw signature bytes instead of the default.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Use a fixed `/M` timestamp instead of the current time.
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }

    /// Reserved raw signature bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a placeholder whose reason is derived from `signers`.
    ///
    /// # Errors
    ///
    /// Fails with a parse error if `pdf` is not a loadable PDF, with
    /// [`Error::InvalidPdf`] if it has no pages, or with [`Error::Config`]
    /// if the capacity is zero or above [`MAX_SIGNATURE_CAPACITY`].
    pub fn insert(&self, pdf: &[u8], signers: &[String], document_id: Option<i64>) -> Result<PreparedPdf> {
        self.insert_with_reason(pdf, &reason_for_signers(signers), document_id)
    }

    /// Insert a placeholder with a ready-made reason text.
    pub fn insert_with_reason(&self, pdf: &[u8], reason: &str, document_id: Option<i64>) -> Result<PreparedPdf> {
        if self.capacity == 0 || self.capacity > MAX_SIGNATURE_CAPACITY {
            return Err(Error::Config(format!(
                "signature capacity must be between 1 and {} bytes, got {}",
                MAX_SIGNATURE_CAPACITY, self.capacity
            )));
        }
        if let Some(id) = document_id {
            log::debug!("Preparing signature placeholder for document {}", id);
        }

        let mut doc = PdfDocument::load(pdf)?;
        let page_ref = doc.first_page_ref()?;
        let catalog_ref = doc.catalog_ref()?;

        let sig_ref = doc.add_object(self.signature_dictionary(reason));
        let appearance_ref = doc.add_object(empty_appearance());

        let field_name = next_field_name(&doc, catalog_ref);
        let widget = ObjectSerializer::dict(vec![
            ("Type", Object::name("Annot")),
            ("Subtype", Object::name("Widget")),
            ("FT", Object::name("Sig")),
            ("Rect", zero_rect()),
            ("V", Object::Reference(sig_ref)),
            ("T", Object::text(&field_name)),
            ("F", Object::Integer(4)),
            ("P", Object::Reference(page_ref)),
            ("AP", ObjectSerializer::dict(vec![("N", Object::Reference(appearance_ref))])),
        ]);
        let widget_ref = doc.add_object(widget);

        append_to_array(&mut doc, page_ref, "Annots", Object::Reference(widget_ref))?;

        let acroform_ref = acroform_ref(&mut doc, catalog_ref)?;
        append_to_array(&mut doc, acroform_ref, "Fields", Object::Reference(widget_ref))?;
        dict_mut(&mut doc, acroform_ref)?.insert("SigFlags".to_string(), Object::Integer(3));

        let written = PdfWriter::new().write(&doc)?;
        let layout = PlaceholderLayout::from_reserved(&written.reserved)?;

        log::info!(
            "Inserted signature field '{}' ({} reserved bytes) on page {}",
            field_name,
            self.capacity,
            page_ref
        );

        Ok(PreparedPdf {
            bytes: written.bytes,
            layout,
        })
    }

    fn signature_dictionary(&self, reason: &str) -> Object {
        let signing_time = self.signing_time.unwrap_or_else(Utc::now);
        ObjectSerializer::dict(vec![
            ("Type", Object::name("Sig")),
            ("Filter", Object::name(SIGNATURE_FILTER)),
            ("SubFilter", Object::name(SIGNATURE_SUB_FILTER)),
            (
                "ByteRange",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Reserved(Reservation::ByteRangeSlot),
                    Object::Reserved(Reservation::ByteRangeSlot),
                    Object::Reserved(Reservation::ByteRangeSlot),
                ]),
            ),
            (
                "Contents",
                Object::Reserved(Reservation::Contents {
                    capacity: self.capacity,
                }),
            ),
            ("Reason", Object::String(encode_text_string(reason))),
            ("M", Object::text(&pdf_date(signing_time))),
        ])
    }
}

fn zero_rect() -> Object {
    Object::Array(vec![Object::Integer(0); 4])
}

/// Empty form XObject used as the widget's normal appearance.
fn empty_appearance() -> Object {
    let mut dict = Dictionary::new();
    dict.insert("Type".to_string(), Object::name("XObject"));
    dict.insert("Subtype".to_string(), Object::name("Form"));
    dict.insert("BBox".to_string(), zero_rect());
    Object::Stream {
        dict,
        data: bytes::Bytes::new(),
    }
}

fn dict_mut(doc: &mut PdfDocument, obj_ref: ObjectRef) -> Result<&mut Dictionary> {
    doc.get_mut(obj_ref)
        .and_then(Object::as_dict_mut)
        .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
}

/// Push `item` onto the array stored under `key` in the dictionary `owner`.
///
/// The array may be direct or indirect; a missing or unusable entry is
/// replaced with a fresh direct array.
fn append_to_array(doc: &mut PdfDocument, owner: ObjectRef, key: &str, item: Object) -> Result<()> {
    let existing = doc.get(owner).and_then(|o| o.get(key)).cloned();
    if let Some(Object::Reference(array_ref)) = existing {
        if let Some(array) = doc.get_mut(array_ref).and_then(Object::as_array_mut) {
            array.push(item);
            return Ok(());
        }
        log::warn!("/{} of {} points at {}, which is not an array; replacing it", key, owner, array_ref);
    }

    let dict = dict_mut(doc, owner)?;
    match dict.get_mut(key) {
        Some(Object::Array(array)) => array.push(item),
        _ => {
            dict.insert(key.to_string(), Object::Array(vec![item]));
        },
    }
    Ok(())
}

/// Reference to the AcroForm dictionary, creating or promoting it to an
/// indirect object as needed.
fn acroform_ref(doc: &mut PdfDocument, catalog_ref: ObjectRef) -> Result<ObjectRef> {
    let existing = doc
        .get(catalog_ref)
        .and_then(|catalog| catalog.get("AcroForm"))
        .cloned();

    let form = match existing {
        Some(Object::Reference(r)) if doc.get(r).and_then(Object::as_dict).is_some() => return Ok(r),
        Some(direct @ Object::Dictionary(_)) => direct,
        _ => ObjectSerializer::dict(vec![("Fields", Object::Array(Vec::new()))]),
    };

    let form_ref = doc.add_object(form);
    dict_mut(doc, catalog_ref)?.insert("AcroForm".to_string(), Object::Reference(form_ref));
    Ok(form_ref)
}

/// `Signature1`, or the first `SignatureN` not already used by a top-level
/// form field.
fn next_field_name(doc: &PdfDocument, catalog_ref: ObjectRef) -> String {
    let taken: HashSet<String> = doc
        .get(catalog_ref)
        .and_then(|catalog| catalog.get("AcroForm"))
        .map(|form| doc.resolve(form))
        .and_then(|form| form.get("Fields"))
        .map(|fields| doc.resolve(fields))
        .and_then(Object::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|field| doc.resolve(field).get("T"))
                .filter_map(|t| doc.resolve(t).as_string())
                .map(decode_text_string)
                .collect()
        })
        .unwrap_or_default();

    (1..)
        .map(|n| format!("Signature{}", n))
        .find(|name| !taken.contains(name))
        .unwrap_or_else(|| "Signature".to_string())
}
