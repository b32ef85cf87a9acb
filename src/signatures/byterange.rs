//! ByteRange resolution for PDF signatures.
//!
//! PDF digital signatures use a ByteRange array to specify which portions
//! of the document are covered by the signature. The signature itself is
//! stored in a placeholder that is excluded from the signed bytes.
//!
//! ## ByteRange Format
//!
//! The ByteRange is an array of four integers `[0, a, b, c]`:
//! - `a` = byte offset of the `<` opening the `/Contents` hex string
//! - `b` = byte offset just past the closing `>`
//! - `c` = remaining bytes to end of file (`len - b`)
//!
//! The placeholder is serialized as `[0 /********** /********** /**********]`.
//! Each sentinel is exactly as wide as the largest offset it can hold, so
//! the numbers are written in place and the file length never changes.

use super::placeholder::PlaceholderLayout;
use crate::error::{Error, Result};
use crate::object::BYTE_RANGE_SENTINEL;
use std::ops::Range;

/// Serialized sentinel, including the name slash.
const SENTINEL: &[u8] = b"/**********";

/// Number of sentinels a signature placeholder carries (`a`, `b`, `c`).
const SENTINEL_COUNT: usize = 3;

/// Resolved `[0, a, b, c]` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Offset of the `<` opening the Contents field (`a`)
    pub contents_start: usize,
    /// Offset just past the `>` closing the Contents field (`b`)
    pub contents_end: usize,
    /// Bytes from `contents_end` to end of file (`c`)
    pub trailing_len: usize,
}

impl ByteRange {
    /// The four PDF array values.
    pub fn as_array(&self) -> [usize; 4] {
        [0, self.contents_start, self.contents_end, self.trailing_len]
    }

    /// Build from the integers of a `/ByteRange` array read from a file.
    pub fn from_values(values: &[i64]) -> Result<Self> {
        let [start, a, b, c] = values else {
            return Err(Error::InvalidPdf(format!(
                "ByteRange must have 4 elements, found {}",
                values.len()
            )));
        };
        if *start != 0 {
            return Err(Error::InvalidPdf(format!("ByteRange must start at 0, got {}", start)));
        }
        let to_usize = |v: i64| {
            usize::try_from(v).map_err(|_| Error::InvalidPdf(format!("negative ByteRange value {}", v)))
        };
        Ok(Self {
            contents_start: to_usize(*a)?,
            contents_end: to_usize(*b)?,
            trailing_len: to_usize(*c)?,
        })
    }

    /// Check the range against the file it claims to describe.
    ///
    /// A valid ByteRange starts at 0, leaves a non-empty gap and ends
    /// exactly at the end of the file.
    pub fn validate(&self, file_size: usize) -> Result<()> {
        if self.contents_start >= self.contents_end {
            return Err(Error::InvalidPdf(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                self.contents_start, self.contents_end
            )));
        }
        let actual_end = self.contents_end.checked_add(self.trailing_len);
        if actual_end != Some(file_size) {
            return Err(Error::InvalidPdf(format!(
                "ByteRange must end at file size {}, got {}+{}",
                file_size, self.contents_end, self.trailing_len
            )));
        }
        Ok(())
    }

    /// Byte span of the delimited Contents field.
    pub fn contents_span(&self) -> Range<usize> {
        self.contents_start..self.contents_end
    }

    /// Hex digits that fit between the Contents delimiters.
    pub fn contents_capacity(&self) -> usize {
        (self.contents_end - self.contents_start).saturating_sub(2)
    }

    /// Concatenate the two signed spans: `bytes[0:a] ++ bytes[b:]`.
    pub fn signed_content(&self, pdf_data: &[u8]) -> Result<Vec<u8>> {
        self.validate(pdf_data.len())?;
        let mut signed = Vec::with_capacity(self.contents_start + self.trailing_len);
        signed.extend_from_slice(&pdf_data[..self.contents_start]);
        signed.extend_from_slice(&pdf_data[self.contents_end..]);
        Ok(signed)
    }
}

/// A serialized document whose ByteRange holds concrete offsets.
#[derive(Debug, Clone)]
pub struct ResolvedPlaceholder {
    /// File bytes, same length as before resolution
    pub bytes: Vec<u8>,
    /// The offsets written into the ByteRange
    pub byte_range: ByteRange,
}

impl ResolvedPlaceholder {
    /// The bytes covered by the signature.
    pub fn signed_content(&self) -> Result<Vec<u8>> {
        self.byte_range.signed_content(&self.bytes)
    }

    /// Write a DER signature into the Contents field.
    ///
    /// The hex encoding is right-padded with `0` to fill the field exactly.
    ///
    /// # Errors
    ///
    /// [`Error::SignatureTooLarge`] if the hex encoding exceeds the field.
    pub fn embed_signature(mut self, signature: &[u8]) -> Result<Vec<u8>> {
        let capacity = self.byte_range.contents_capacity();
        let signature_hex = hex::encode(signature);
        if signature_hex.len() > capacity {
            return Err(Error::SignatureTooLarge {
                size: signature_hex.len(),
                capacity,
            });
        }

        let span = self.byte_range.contents_span();
        let field = &mut self.bytes[span];
        field[0] = b'<';
        field[1..=signature_hex.len()].copy_from_slice(signature_hex.as_bytes());
        field[signature_hex.len() + 1..=capacity].fill(b'0');
        field[capacity + 1] = b'>';

        Ok(self.bytes)
    }
}

/// Rewrites ByteRange sentinels with concrete offsets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteRangeResolver;

impl ByteRangeResolver {
    /// Resolve by searching the buffer for the sentinels and the
    /// `/Contents <...>` field that follows them.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedPlaceholder`] unless exactly three sentinels and a
    /// following hex Contents field are present.
    pub fn resolve(buffer: Vec<u8>) -> Result<ResolvedPlaceholder> {
        let slots = find_sentinels(&buffer);
        let slots: [usize; SENTINEL_COUNT] = slots.as_slice().try_into().map_err(|_| {
            Error::MalformedPlaceholder(format!(
                "expected {} ByteRange sentinels, found {}",
                SENTINEL_COUNT,
                slots.len()
            ))
        })?;

        let search_from = slots[SENTINEL_COUNT - 1] + SENTINEL.len();
        let contents = find_contents_field(&buffer, search_from).ok_or_else(|| {
            Error::MalformedPlaceholder("no /Contents hex field after ByteRange".to_string())
        })?;

        write_offsets(buffer, slots, contents)
    }

    /// Resolve using the spans the serializer reported.
    ///
    /// The spans are cross-checked against the buffer: each slot must hold a
    /// sentinel, the buffer must hold exactly three of them, and the Contents
    /// span must be a `<...>` delimited hex field.
    pub fn resolve_with_layout(buffer: Vec<u8>, layout: &PlaceholderLayout) -> Result<ResolvedPlaceholder> {
        for &slot in &layout.byte_range_slots {
            if buffer.get(slot..slot + SENTINEL.len()) != Some(SENTINEL) {
                return Err(Error::MalformedPlaceholder(format!(
                    "no ByteRange sentinel at offset {}",
                    slot
                )));
            }
        }
        let found = find_sentinels(&buffer).len();
        if found != SENTINEL_COUNT {
            return Err(Error::MalformedPlaceholder(format!(
                "expected {} ByteRange sentinels, found {}",
                SENTINEL_COUNT, found
            )));
        }

        let contents = layout.contents.clone();
        let is_hex_field = buffer.get(contents.clone()).is_some_and(|field| {
            field.len() >= 2
                && field[0] == b'<'
                && field[field.len() - 1] == b'>'
                && field[1..field.len() - 1].iter().all(u8::is_ascii_hexdigit)
        });
        if !is_hex_field {
            return Err(Error::MalformedPlaceholder(format!(
                "bytes {}..{} are not a hex Contents field",
                contents.start, contents.end
            )));
        }

        write_offsets(buffer, layout.byte_range_slots, contents)
    }
}

fn find_sentinels(buffer: &[u8]) -> Vec<usize> {
    debug_assert_eq!(&SENTINEL[1..], BYTE_RANGE_SENTINEL.as_bytes());
    buffer
        .windows(SENTINEL.len())
        .enumerate()
        .filter(|(_, window)| *window == SENTINEL)
        .map(|(pos, _)| pos)
        .collect()
}

/// Locate `/Contents` followed by optional whitespace and a hex string.
fn find_contents_field(buffer: &[u8], from: usize) -> Option<Range<usize>> {
    const KEY: &[u8] = b"/Contents";
    let window = buffer.get(from..)?;
    let key_pos = window.windows(KEY.len()).position(|w| w == KEY)?;

    let mut start = from + key_pos + KEY.len();
    while buffer.get(start).is_some_and(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {
        start += 1;
    }
    if buffer.get(start) != Some(&b'<') {
        return None;
    }

    let digits = buffer[start + 1..]
        .iter()
        .take_while(|b| b.is_ascii_hexdigit())
        .count();
    let close = start + 1 + digits;
    (buffer.get(close) == Some(&b'>')).then(|| start..close + 1)
}

fn write_offsets(
    mut buffer: Vec<u8>,
    slots: [usize; SENTINEL_COUNT],
    contents: Range<usize>,
) -> Result<ResolvedPlaceholder> {
    let original_len = buffer.len();
    let byte_range = ByteRange {
        contents_start: contents.start,
        contents_end: contents.end,
        trailing_len: original_len - contents.end,
    };
    byte_range
        .validate(original_len)
        .map_err(|e| Error::MalformedPlaceholder(e.to_string()))?;

    let values = [byte_range.contents_start, byte_range.contents_end, byte_range.trailing_len];
    for (slot, value) in slots.into_iter().zip(values) {
        if contents.contains(&slot) {
            return Err(Error::MalformedPlaceholder(format!(
                "ByteRange sentinel at {} lies inside the Contents field",
                slot
            )));
        }
        let text = format!("{:<width$}", value, width = SENTINEL.len());
        if text.len() != SENTINEL.len() {
            return Err(Error::MalformedPlaceholder(format!(
                "offset {} does not fit in {} bytes",
                value,
                SENTINEL.len()
            )));
        }
        buffer[slot..slot + SENTINEL.len()].copy_from_slice(text.as_bytes());
    }

    debug_assert_eq!(buffer.len(), original_len);
    log::debug!("Resolved ByteRange {:?}", byte_range.as_array());

    Ok(ResolvedPlaceholder { bytes: buffer, byte_range })
}
