//! Cross-reference reconstruction for damaged files.
//!
//! When `startxref` is missing, points at garbage, or the table it leads to
//! is empty, the whole file is scanned for `N G obj` headers. Later
//! definitions of the same object number win, matching how incremental
//! updates shadow older revisions. The trailer comes from the last
//! `trailer << ... >>` in the file, else from the last xref stream
//! dictionary, else it is synthesised around the first catalog found.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser::{parse_indirect_object, parse_object};
use crate::xref::{CrossRefTable, XRefEntry};
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    static ref RE_OBJ_HEADER: Regex =
        Regex::new(r"(?-u)(?:^|[\s%])(\d{1,10})[ \t\r\n\f\x00]+(\d{1,5})[ \t\r\n\f\x00]+obj\b")
            .expect("static regex");
    static ref RE_TRAILER: Regex = Regex::new(r"(?-u)trailer[\s]*<<").expect("static regex");
}

/// Rebuild the cross-reference table by scanning `data`.
///
/// # Errors
///
/// Returns [`Error::InvalidXref`] when no objects are found and
/// [`Error::InvalidPdf`] when no usable trailer or catalog exists.
pub fn reconstruct_xref(data: &[u8]) -> Result<CrossRefTable> {
    log::info!("Reconstructing xref table by scanning {} bytes", data.len());

    let mut table = CrossRefTable::new();
    let mut catalog: Option<ObjectRef> = None;
    let mut xref_stream_trailer: Option<Dictionary> = None;

    for caps in RE_OBJ_HEADER.captures_iter(data) {
        let (Some(num), Some(gen)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let (Some(id), Some(gen)) = (ascii_number(num.as_bytes()), ascii_number(gen.as_bytes()))
        else {
            continue;
        };
        let Ok(gen) = u16::try_from(gen) else { continue };
        let Ok(id) = u32::try_from(id) else { continue };

        let offset = num.start();

        // Only objects that actually parse are trusted; this filters out
        // "1 0 obj" sequences inside binary stream data.
        let Ok((_, (_, object))) = parse_indirect_object(&data[offset..], None) else {
            continue;
        };

        if object.has_type("Catalog") {
            catalog = Some(ObjectRef::new(id, gen));
        }
        if object.has_type("XRef") {
            xref_stream_trailer = object.as_dict().cloned();
        }
        table.add_entry(id, XRefEntry::Uncompressed { offset, gen });
    }

    if table.is_empty() {
        return Err(Error::InvalidXref);
    }

    let trailer = find_last_trailer(data)
        .or(xref_stream_trailer)
        .filter(|t| t.contains_key("Root"))
        .or_else(|| {
            catalog.map(|root| {
                let mut dict = Dictionary::new();
                dict.insert("Root".to_string(), Object::Reference(root));
                dict
            })
        })
        .ok_or_else(|| Error::InvalidPdf("no trailer or catalog found".to_string()))?;

    let mut trailer = trailer;
    trailer.remove("Prev");
    trailer.remove("XRefStm");
    table.set_trailer(trailer);

    log::info!("Reconstructed xref with {} objects", table.len());
    Ok(table)
}

fn ascii_number(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn find_last_trailer(data: &[u8]) -> Option<Dictionary> {
    let found = RE_TRAILER.find_iter(data).last()?;
    let dict_start = found.end() - 2;
    match parse_object(&data[dict_start..]) {
        Ok((_, Object::Dictionary(dict))) => Some(dict),
        _ => None,
    }
}
