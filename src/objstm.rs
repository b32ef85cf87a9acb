//! Object stream parsing (PDF 1.5+).
//!
//! An object stream (`/Type /ObjStm`) packs `/N` objects into one compressed
//! stream. The decoded data starts with `N` pairs of integers (object number,
//! offset relative to `/First`) followed by the objects themselves:
//!
//! ```text
//! 10 0 11 15 12 28
//! << /Type /Annot ... >>   % object 10 at First + 0
//! [ 0 0 612 792 ]          % object 11 at First + 15
//! ...
//! ```
//!
//! The writer never produces object streams; their members are inlined into
//! the document arena when a file is loaded.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::parse_object;
use std::collections::HashMap;

/// Parse an object stream and return its members keyed by object number.
///
/// # Errors
///
/// Fails if the object is not an `ObjStm` stream, `/N` or `/First` are
/// missing, the stream cannot be decoded or the offset table is short.
/// Individual members that fail to parse are skipped with a warning.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };

    if !stream_obj.has_type("ObjStm") {
        return Err(Error::InvalidPdf("object stream missing /Type /ObjStm".to_string()));
    }

    let count = dict
        .get("N")
        .and_then(Object::as_integer)
        .filter(|n| *n >= 0)
        .ok_or_else(|| Error::InvalidPdf("object stream missing /N".to_string()))? as usize;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .filter(|n| *n >= 0)
        .ok_or_else(|| Error::InvalidPdf("object stream missing /First".to_string()))?
        as usize;

    let data = stream_obj.decode_stream_data()?;
    if first > data.len() {
        return Err(Error::InvalidPdf(format!(
            "object stream /First {} beyond decoded length {}",
            first,
            data.len()
        )));
    }

    let pairs = read_offset_table(&data[..first], count)?;
    let mut objects = HashMap::with_capacity(pairs.len());

    for (obj_num, offset) in pairs {
        let start = first + offset;
        if start >= data.len() {
            log::warn!("Object {} offset {} lies outside its object stream", obj_num, offset);
            continue;
        }
        match parse_object(&data[start..]) {
            Ok((_, obj)) => {
                objects.insert(obj_num, obj);
            },
            Err(e) => log::warn!("Skipping object {} in object stream: {:?}", obj_num, e),
        }
    }

    Ok(objects)
}

fn read_offset_table(header: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count.min(65_536));
    let mut input = header;

    for index in 0..count {
        let mut next_int = || -> Result<i64> {
            match token(input) {
                Ok((rest, Token::Integer(value))) if value >= 0 => {
                    input = rest;
                    Ok(value)
                },
                _ => Err(Error::InvalidPdf(format!(
                    "object stream offset table truncated at entry {}",
                    index
                ))),
            }
        };
        let obj_num = next_int()?;
        let offset = next_int()?;
        pairs.push((obj_num as u32, offset as usize));
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dictionary;

    fn objstm(n: i64, first: i64, data: &[u8]) -> Object {
        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("ObjStm"));
        dict.insert("N".to_string(), Object::Integer(n));
        dict.insert("First".to_string(), Object::Integer(first));
        Object::Stream {
            dict,
            data: bytes::Bytes::copy_from_slice(data),
        }
    }

    #[test]
    fn test_parse_two_members() {
        let header = b"7 0 8 12 ";
        let body = b"<< /A 1 >>  [1 2 3]";
        let mut data = header.to_vec();
        data.extend_from_slice(body);

        let objects = parse_object_stream(&objstm(2, header.len() as i64, &data)).unwrap();
        assert_eq!(objects.len(), 2);
        assert!(objects[&7].as_dict().is_some());
        assert_eq!(objects[&8].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_truncated_offset_table() {
        let err = parse_object_stream(&objstm(3, 4, b"7 0 <<>>")).unwrap_err();
        assert!(matches!(err, Error::InvalidPdf(_)));
    }

    #[test]
    fn test_rejects_non_objstm() {
        assert!(parse_object_stream(&Object::Null).is_err());

        let mut dict = Dictionary::new();
        dict.insert("Type".to_string(), Object::name("XRef"));
        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::new(),
        };
        assert!(parse_object_stream(&stream).is_err());
    }
}
