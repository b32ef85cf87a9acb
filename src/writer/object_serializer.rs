//! PDF object serialization.
//!
//! Serializes PDF objects to their byte representation according to
//! PDF specification ISO 32000-1:2008. [`Object::Reserved`] fields are written
//! as fixed-width placeholders and their byte spans are recorded so the
//! caller can patch them in place after the whole file has been laid out.

use crate::lexer::is_delimiter;
use crate::object::{Dictionary, Object, ObjectRef, Reservation, BYTE_RANGE_SENTINEL};

/// Byte span of a reserved field inside serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedSpan {
    /// What was reserved
    pub reservation: Reservation,
    /// Offset of the first placeholder byte
    pub offset: usize,
    /// Number of placeholder bytes
    pub len: usize,
}

impl ReservedSpan {
    /// Offset one past the last placeholder byte.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Serializer for PDF objects.
///
/// Converts PDF Object types to their byte representation following
/// the PDF specification syntax rules.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

impl ObjectSerializer {
    /// Create a new object serializer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes, discarding reserved-field positions.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj, &mut Vec::new());
        buf
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).to_string()
    }

    /// Append an indirect object definition to `out`.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`. Reserved fields are
    /// recorded in `reserved` with offsets relative to the start of `out`.
    pub fn write_indirect(
        &self,
        out: &mut Vec<u8>,
        obj_ref: ObjectRef,
        obj: &Object,
        reserved: &mut Vec<ReservedSpan>,
    ) {
        out.extend_from_slice(format!("{} {} obj\n", obj_ref.id, obj_ref.gen).as_bytes());
        self.write_object(out, obj, reserved);
        out.extend_from_slice(b"\nendobj\n");
    }

    fn write_object(&self, w: &mut Vec<u8>, obj: &Object, reserved: &mut Vec<ReservedSpan>) {
        match obj {
            Object::Null => w.extend_from_slice(b"null"),
            Object::Boolean(b) => w.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => w.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => self.write_real(w, *r),
            Object::String(s) => self.write_string(w, s),
            Object::HexString(s) => write_hex(w, s),
            Object::Name(n) => self.write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr, reserved),
            Object::Dictionary(dict) => self.write_dictionary(w, dict, reserved),
            Object::Stream { dict, data } => self.write_stream(w, dict, data, reserved),
            Object::Reference(r) => w.extend_from_slice(r.to_string().as_bytes()),
            Object::Reserved(reservation) => self.write_reserved(w, *reservation, reserved),
        }
    }

    /// Write a fixed-width placeholder and remember where it went.
    fn write_reserved(&self, w: &mut Vec<u8>, reservation: Reservation, reserved: &mut Vec<ReservedSpan>) {
        let offset = w.len();
        match reservation {
            Reservation::ByteRangeSlot => {
                w.push(b'/');
                w.extend_from_slice(BYTE_RANGE_SENTINEL.as_bytes());
            },
            Reservation::Contents { capacity } => {
                w.push(b'<');
                w.resize(w.len() + capacity * 2, b'0');
                w.push(b'>');
            },
        }
        debug_assert_eq!(w.len() - offset, reservation.serialized_len());
        reserved.push(ReservedSpan {
            reservation,
            offset,
            len: w.len() - offset,
        });
    }

    /// Write a real number with appropriate precision.
    fn write_real(&self, w: &mut Vec<u8>, value: f64) {
        if !value.is_finite() {
            w.push(b'0');
        } else if value.fract() == 0.0 {
            w.extend_from_slice((value as i64).to_string().as_bytes());
        } else {
            // Format with enough precision, then trim trailing zeros
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            w.extend_from_slice(trimmed.as_bytes());
        }
    }

    /// Write a PDF string.
    ///
    /// Uses literal string syntax `(...)` with proper escaping,
    /// or hex string syntax `<...>` for binary data.
    fn write_string(&self, w: &mut Vec<u8>, data: &[u8]) {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if !is_printable {
            write_hex(w, data);
            return;
        }

        w.push(b'(');
        for &byte in data {
            match byte {
                b'(' => w.extend_from_slice(b"\\("),
                b')' => w.extend_from_slice(b"\\)"),
                b'\\' => w.extend_from_slice(b"\\\\"),
                b'\n' => w.extend_from_slice(b"\\n"),
                b'\r' => w.extend_from_slice(b"\\r"),
                b'\t' => w.extend_from_slice(b"\\t"),
                _ => w.push(byte),
            }
        }
        w.push(b')');
    }

    /// Write a PDF name.
    ///
    /// Names start with `/`; anything but a regular character is written as
    /// `#xx`. Chars up to U+00FF stand for the byte of the same value.
    fn write_name(&self, w: &mut Vec<u8>, name: &str) {
        w.push(b'/');
        let mut utf8 = [0u8; 4];
        for c in name.chars() {
            let bytes: &[u8] = match u8::try_from(c) {
                Ok(byte) => &[byte],
                Err(_) => c.encode_utf8(&mut utf8).as_bytes(),
            };
            for &byte in bytes {
                if (0x21..=0x7E).contains(&byte) && byte != b'#' && !is_delimiter(byte) {
                    w.push(byte);
                } else {
                    w.extend_from_slice(format!("#{:02X}", byte).as_bytes());
                }
            }
        }
    }

    fn write_array(&self, w: &mut Vec<u8>, arr: &[Object], reserved: &mut Vec<ReservedSpan>) {
        w.push(b'[');
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                w.push(b' ');
            }
            self.write_object(w, obj, reserved);
        }
        w.push(b']');
    }

    fn write_dictionary(&self, w: &mut Vec<u8>, dict: &Dictionary, reserved: &mut Vec<ReservedSpan>) {
        w.extend_from_slice(b"<<");

        // Sort keys for deterministic output
        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for (i, key) in keys.into_iter().enumerate() {
            if self.compact {
                if i > 0 {
                    w.push(b' ');
                }
            } else {
                w.extend_from_slice(b"\n  ");
            }
            self.write_name(w, key);
            w.push(b' ');
            self.write_object(w, &dict[key], reserved);
        }

        if !self.compact && !dict.is_empty() {
            w.push(b'\n');
        }
        w.extend_from_slice(b">>");
    }

    /// Write a PDF stream. `/Length` always reflects the stored data.
    fn write_stream(&self, w: &mut Vec<u8>, dict: &Dictionary, data: &[u8], reserved: &mut Vec<ReservedSpan>) {
        let mut dict_with_length = dict.clone();
        dict_with_length.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(w, &dict_with_length, reserved);
        w.extend_from_slice(b"\nstream\n");
        w.extend_from_slice(data);
        w.extend_from_slice(b"\nendstream");
    }
}

fn write_hex(w: &mut Vec<u8>, data: &[u8]) {
    w.push(b'<');
    w.extend_from_slice(hex::encode_upper(data).as_bytes());
    w.push(b'>');
}

/// Helper functions for building PDF objects.
impl ObjectSerializer {
    /// Create a Dictionary object.
    pub fn dict(entries: Vec<(&str, Object)>) -> Object {
        let map: Dictionary = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Object::Dictionary(map)
    }
}
