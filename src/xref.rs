//! Cross-reference table reader.
//!
//! The xref maps object numbers to where their bytes live: a file offset for
//! plain objects or an (object stream, index) pair for compressed ones.
//! Both classic tables (`xref ... trailer`) and cross-reference streams
//! (`/Type /XRef`) are read, following `/Prev` chains of incremental updates
//! and the `/XRefStm` entry of hybrid files. Newer sections win.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dictionary, Object};
use crate::parser::{parse_indirect_object, parse_object, to_parse_error};
use std::collections::{HashMap, HashSet};

/// Maximum number of chained xref sections followed before giving up.
const MAX_XREF_SECTIONS: usize = 100;

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object slot
    Free,
    /// Object stored at a byte offset in the file
    Uncompressed {
        /// Byte offset of `N G obj`
        offset: usize,
        /// Generation number
        gen: u16,
    },
    /// Object stored inside an object stream
    Compressed {
        /// Object number of the containing object stream
        stream: u32,
        /// Index within the object stream
        index: u32,
    },
}

impl XRefEntry {
    /// Whether the entry points at a live object.
    pub fn in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free)
    }
}

/// Cross-reference table plus the trailer dictionary that came with it.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Dictionary,
}

impl CrossRefTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// All entries, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, XRefEntry)> + '_ {
        self.entries.iter().map(|(id, entry)| (*id, *entry))
    }

    /// The trailer dictionary.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Replace the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = trailer;
    }

    /// Merge an older section: existing entries win, missing trailer keys
    /// are filled in.
    pub fn merge_older(&mut self, older: CrossRefTable) {
        for (id, entry) in older.entries {
            self.entries.entry(id).or_insert(entry);
        }
        for (key, value) in older.trailer {
            self.trailer.entry(key).or_insert(value);
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the offset announced by the last `startxref` in the file.
///
/// Only the final 2 KB are searched.
pub fn find_xref_offset(data: &[u8]) -> Result<usize> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or(Error::InvalidXref)?;

    match token(&tail[pos + keyword.len()..]) {
        Ok((_, Token::Integer(offset))) if offset >= 0 && (offset as usize) < data.len() => {
            Ok(offset as usize)
        },
        _ => Err(Error::InvalidXref),
    }
}

/// Parse the cross-reference section at `offset` and everything it chains to.
pub fn parse_xref(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut pending = vec![offset];
    let mut table: Option<CrossRefTable> = None;

    while let Some(section_offset) = pending.pop() {
        if !visited.insert(section_offset) {
            log::warn!("xref section at {} already visited, ignoring loop", section_offset);
            continue;
        }
        if visited.len() > MAX_XREF_SECTIONS {
            return Err(Error::InvalidPdf(format!(
                "xref chain longer than {} sections",
                MAX_XREF_SECTIONS
            )));
        }

        let section = parse_section(data, section_offset)?;
        log::debug!(
            "xref section at {}: {} entries",
            section_offset,
            section.len()
        );

        // `/Prev` is pushed first so a hybrid file's `/XRefStm` is merged
        // before the older revision it belongs on top of.
        if let Some(prev) = offset_entry(section.trailer(), "Prev") {
            pending.push(prev);
        }
        if let Some(stm) = offset_entry(section.trailer(), "XRefStm") {
            pending.push(stm);
        }

        match table.as_mut() {
            None => table = Some(section),
            Some(newer) => newer.merge_older(section),
        }
    }

    table.ok_or(Error::InvalidXref)
}

fn offset_entry(trailer: &Dictionary, key: &str) -> Option<usize> {
    trailer
        .get(key)
        .and_then(Object::as_integer)
        .and_then(|v| usize::try_from(v).ok())
}

fn parse_section(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let section = data.get(offset..).ok_or(Error::InvalidXref)?;
    let start = section
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .ok_or(Error::InvalidXref)?;

    if section[start..].starts_with(b"xref") {
        parse_traditional_xref(data, offset + start)
    } else if section[start].is_ascii_digit() {
        parse_xref_stream(data, offset + start)
    } else {
        Err(Error::InvalidXref)
    }
}

/// Parse a classic table:
///
/// ```text
/// xref
/// 0 3
/// 0000000000 65535 f
/// 0000000015 00000 n
/// 0000000079 00000 n
/// trailer
/// << /Size 3 /Root 1 0 R >>
/// ```
fn parse_traditional_xref(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let mut cursor = offset + b"xref".len();

    loop {
        let line_start = skip_whitespace(data, cursor);
        if data[line_start..].starts_with(b"trailer") {
            cursor = line_start + b"trailer".len();
            break;
        }

        let (start_obj, count, after_header) = read_two_ints(data, line_start)?;
        if count > 10_000_000 {
            return Err(Error::InvalidPdf("xref subsection count exceeds limit".to_string()));
        }
        cursor = after_header;

        for i in 0..count {
            let entry_start = skip_whitespace(data, cursor);
            let (field_offset, gen, after_nums) = read_two_ints(data, entry_start)?;
            let kind_pos = skip_whitespace(data, after_nums);
            let kind = *data.get(kind_pos).ok_or(Error::InvalidXref)?;
            cursor = kind_pos + 1;

            let object_number = (start_obj + i) as u32;
            let entry = match kind {
                b'n' => XRefEntry::Uncompressed {
                    offset: field_offset as usize,
                    gen: gen.min(u16::MAX as u64) as u16,
                },
                b'f' => XRefEntry::Free,
                other => {
                    log::warn!(
                        "xref entry {} has type flag {:?}, treating as free",
                        object_number,
                        other as char
                    );
                    XRefEntry::Free
                },
            };
            table.add_entry(object_number, entry);
        }
    }

    let (_, trailer) = parse_object(&data[cursor..])
        .map_err(|e| to_parse_error(&data[cursor..], cursor, e))?;
    match trailer {
        Object::Dictionary(dict) => table.set_trailer(dict),
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            })
        },
    }

    Ok(table)
}

fn skip_whitespace(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && (data[pos].is_ascii_whitespace() || data[pos] == 0) {
        pos += 1;
    }
    pos
}

fn read_uint(data: &[u8], pos: usize) -> Result<(u64, usize)> {
    let digits = data[pos.min(data.len())..]
        .iter()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits == 0 || digits > 19 {
        return Err(Error::InvalidXref);
    }
    let text = std::str::from_utf8(&data[pos..pos + digits]).map_err(|_| Error::InvalidXref)?;
    let value = text.parse::<u64>().map_err(|_| Error::InvalidXref)?;
    Ok((value, pos + digits))
}

fn read_two_ints(data: &[u8], pos: usize) -> Result<(u64, u64, usize)> {
    let (first, after_first) = read_uint(data, pos)?;
    let (second, after_second) = read_uint(data, skip_whitespace(data, after_first))?;
    Ok((first, second, after_second))
}

/// Parse a cross-reference stream. Its dictionary doubles as the trailer.
fn parse_xref_stream(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let (_, (_, obj)) = parse_indirect_object(&data[offset..], None)
        .map_err(|e| to_parse_error(&data[offset..], offset, e))?;

    if !obj.has_type("XRef") {
        return Err(Error::InvalidPdf(format!(
            "object at {} is not an xref stream",
            offset
        )));
    }
    let dict = obj.as_dict().cloned().unwrap_or_default();

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| {
            w.iter()
                .map(|v| v.as_integer().unwrap_or(0).max(0) as usize)
                .collect()
        })
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|w| *w > 8) {
        return Err(Error::InvalidPdf("invalid /W array in xref stream".to_string()));
    }

    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("missing /Size in xref stream".to_string()))?;

    let ranges: Vec<(u64, u64)> = match dict.get("Index").and_then(Object::as_array) {
        Some(index) => index
            .chunks_exact(2)
            .filter_map(|pair| Some((pair[0].as_integer()? as u64, pair[1].as_integer()? as u64)))
            .collect(),
        None => vec![(0, size.max(0) as u64)],
    };

    let decoded = obj.decode_stream_data()?;
    let entry_size: usize = widths.iter().sum();
    if entry_size == 0 {
        return Err(Error::InvalidPdf("xref stream entry width is zero".to_string()));
    }

    let mut table = CrossRefTable::new();
    let mut rows = decoded.chunks_exact(entry_size);

    'ranges: for (start, count) in ranges {
        for i in 0..count {
            let Some(row) = rows.next() else {
                log::warn!("xref stream shorter than its /Index declares");
                break 'ranges;
            };
            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            // A zero-width type field defaults to type 1.
            let kind = if widths[0] == 0 { 1 } else { be_uint(f1) };
            let entry = match kind {
                0 => XRefEntry::Free,
                1 => XRefEntry::Uncompressed {
                    offset: be_uint(f2) as usize,
                    gen: be_uint(f3).min(u16::MAX as u64) as u16,
                },
                2 => XRefEntry::Compressed {
                    stream: be_uint(f2) as u32,
                    index: be_uint(f3) as u32,
                },
                // Unknown types are references to the null object.
                _ => XRefEntry::Free,
            };
            table.add_entry((start + i) as u32, entry);
        }
    }

    table.set_trailer(dict);
    Ok(table)
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}
