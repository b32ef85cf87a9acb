//! PDF document writer.
//!
//! Rewrites a [`PdfDocument`] as a complete file: header, every object in
//! ascending id order, a classic xref table and trailer. Object streams are
//! never produced, so every object sits at a plain byte offset.

use super::object_serializer::{ObjectSerializer, ReservedSpan};
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use std::io::Write;

/// Highest object number a cross-reference table may carry.
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

/// Serialized document plus the positions of its reserved fields.
#[derive(Debug, Clone)]
pub struct WrittenPdf {
    /// Complete file bytes
    pub bytes: Vec<u8>,
    /// Reserved fields in the order they were written
    pub reserved: Vec<ReservedSpan>,
}

/// Writes whole documents without incremental updates.
#[derive(Debug, Clone)]
pub struct PdfWriter {
    serializer: ObjectSerializer,
}

impl PdfWriter {
    /// Create a writer using compact object formatting.
    pub fn new() -> Self {
        Self {
            serializer: ObjectSerializer::compact(),
        }
    }

    /// Build the complete PDF file for `doc`.
    pub fn write(&self, doc: &PdfDocument) -> Result<WrittenPdf> {
        let mut output = Vec::new();
        let mut reserved = Vec::new();
        let mut offsets: Vec<(u32, u16, usize)> = Vec::with_capacity(doc.len());

        let (major, minor) = doc.version();
        writeln!(output, "%PDF-{}.{}", major, minor)?;
        // Binary marker (recommended for binary content)
        output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        for (obj_ref, obj) in doc.objects() {
            offsets.push((obj_ref.id, obj_ref.gen, output.len()));
            self.serializer
                .write_indirect(&mut output, obj_ref, obj, &mut reserved);
        }

        let max_object_number = doc.max_object_number();
        if max_object_number > MAX_OBJECT_NUMBER {
            return Err(Error::InvalidPdf(format!(
                "object number {} exceeds the limit of {}",
                max_object_number, MAX_OBJECT_NUMBER
            )));
        }
        let size = max_object_number + 1;
        let xref_start = output.len();
        writeln!(output, "xref")?;
        write_xref_entries(&mut output, &offsets)?;

        writeln!(output, "trailer")?;
        let trailer = Object::Dictionary(self.trailer(doc, size));
        output.extend_from_slice(&self.serializer.serialize(&trailer));
        writeln!(output)?;
        writeln!(output, "startxref")?;
        writeln!(output, "{}", xref_start)?;
        writeln!(output, "%%EOF")?;

        log::debug!(
            "Wrote {} objects, {} bytes, {} reserved fields",
            offsets.len(),
            output.len(),
            reserved.len()
        );

        Ok(WrittenPdf {
            bytes: output,
            reserved,
        })
    }

    fn trailer(&self, doc: &PdfDocument, size: u32) -> Dictionary {
        let mut trailer = Dictionary::new();
        trailer.insert("Size".to_string(), Object::Integer(i64::from(size)));
        for key in ["Root", "Info", "ID"] {
            if let Some(value) = doc.trailer().get(key) {
                trailer.insert(key.to_string(), value.clone());
            }
        }
        trailer
    }
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Write one subsection per run of consecutive object numbers. Object 0
/// heads an empty free list; unlisted numbers are free.
fn write_xref_entries(output: &mut Vec<u8>, offsets: &[(u32, u16, usize)]) -> Result<()> {
    let mut entries: Vec<(u32, u16, usize)> = Vec::with_capacity(offsets.len() + 1);
    entries.push((0, 65535, 0));
    entries.extend(offsets.iter().copied().filter(|(id, _, _)| *id != 0));
    entries.sort_unstable_by_key(|(id, _, _)| *id);

    let mut start = 0;
    while start < entries.len() {
        let mut end = start + 1;
        while end < entries.len() && entries[end].0 == entries[end - 1].0 + 1 {
            end += 1;
        }

        writeln!(output, "{} {}", entries[start].0, end - start)?;
        for &(id, gen, offset) in &entries[start..end] {
            if id == 0 {
                writeln!(output, "0000000000 65535 f ")?;
            } else {
                writeln!(output, "{:010} {:05} n ", offset, gen)?;
            }
        }
        start = end;
    }
    Ok(())
}
