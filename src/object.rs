//! PDF object types.
//!
//! The object graph is a plain tagged enum. Indirect objects live in the
//! document arena keyed by object number and refer to each other through
//! [`ObjectRef`]; nothing here owns another indirect object.
//!
//! [`Object::Reserved`] is the one variant that never appears in parsed input.
//! It marks a fixed-width field whose final value is only known after
//! serialization (the signature `ByteRange` slots and `Contents` blob). The
//! writer emits a placeholder for it and reports where the bytes landed.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Dictionary payload shared by [`Object::Dictionary`] and [`Object::Stream`].
pub type Dictionary = HashMap<String, Object>;

/// Placeholder token written for each unresolved `ByteRange` slot.
pub const BYTE_RANGE_SENTINEL: &str = "**********";

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// Literal string (byte array)
    String(Vec<u8>),
    /// Hexadecimal string (decoded bytes)
    HexString(Vec<u8>),
    /// Name (without the leading /). Parsed names hold one char per
    /// byte, U+0000 to U+00FF.
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dictionary),
    /// Stream (dictionary + raw, still-encoded data)
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Stream data
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
    /// Fixed-width field filled in after serialization
    Reserved(Reservation),
}

/// A field whose bytes are reserved at serialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// One `ByteRange` entry, written as the sentinel name `/**********`.
    ByteRangeSlot,
    /// Signature `Contents`, written as a zero-filled hex string holding
    /// `capacity` bytes (`2 * capacity` hex digits plus delimiters).
    Contents {
        /// Number of raw bytes the field can hold
        capacity: usize,
    },
}

impl Reservation {
    /// Number of bytes the serialized placeholder occupies.
    pub fn serialized_len(&self) -> usize {
        match self {
            Reservation::ByteRangeSlot => BYTE_RANGE_SENTINEL.len() + 1,
            Reservation::Contents { capacity } => capacity * 2 + 2,
        }
    }
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::HexString(_) => "HexString",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
            Object::Reserved(_) => "Reserved",
        }
    }

    /// Create a name object.
    pub fn name(name: impl Into<String>) -> Self {
        Object::Name(name.into())
    }

    /// Create a literal string object from text.
    pub fn text(text: &str) -> Self {
        Object::String(text.as_bytes().to_vec())
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to a number, accepting integers and reals.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Mutable dictionary access. Works for both Dictionary and Stream objects.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Mutable array access.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string bytes. Literal and hex strings both qualify.
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) | Object::HexString(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Dictionary lookup that also accepts stream dictionaries.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Whether this is a dictionary (or stream) with `/Type /<type_name>`.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.get("Type").and_then(Object::as_name) == Some(type_name)
    }

    /// Decode stream data using the filters named in the stream dictionary.
    ///
    /// # Errors
    ///
    /// Fails if this is not a stream or a filter is unsupported or corrupt.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        match self {
            Object::Stream { dict, data } => crate::decoders::decode_stream(dict, data),
            _ => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }
}

/// Decode a PDF text string.
///
/// Strings starting with the UTF-16BE byte-order mark are decoded as UTF-16,
/// anything else is read as PDFDocEncoding, approximated by Latin-1.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode text as a PDF text string.
///
/// ASCII text is stored as-is; anything else becomes UTF-16BE with a BOM.
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut out = Vec::with_capacity(2 + text.len() * 2);
    out.extend_from_slice(&[0xFE, 0xFF]);
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}
