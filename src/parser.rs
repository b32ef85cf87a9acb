//! PDF object parser.
//!
//! Recursive descent over the lexer's tokens: scalars map straight to
//! [`Object`] variants, `[`/`<<` recurse, `N G R` becomes a reference and a
//! dictionary followed by `stream` becomes a stream object.

use crate::error::{Error, Result};
use crate::lexer::{skip_ws, token, Token};
use crate::object::{Dictionary, Object, ObjectRef};
use nom::IResult;

/// Nesting limit for arrays and dictionaries.
const MAX_DEPTH: usize = 256;

/// Decode escape sequences in a literal string body.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd` (1-3 digits), line
/// continuations (`\` before an end-of-line) and normalises bare CR / CRLF
/// inside the string to LF.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let c = raw[i];
        if c == b'\r' {
            out.push(b'\n');
            i += if raw.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            continue;
        }
        if c != b'\\' || i + 1 >= raw.len() {
            out.push(c);
            i += 1;
            continue;
        }

        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'(' | b')' | b'\\' => out.push(next),
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'\n' => {},
            b'0'..=b'7' => {
                let mut value = (next - b'0') as u32;
                let mut digits = 1;
                while digits < 3 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            i += 1;
                            digits += 1;
                        },
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            },
            // Unknown escape: the backslash is dropped.
            other => out.push(other),
        }
    }

    out
}

/// Decode the body of a hex string. Whitespace is ignored and an odd final
/// digit is treated as if followed by `0`.
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace() && *c != 0)
        .collect();

    let nibble = |c: u8| -> Result<u8> {
        (c as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or_else(|| Error::Decode(format!("invalid hex digit {:?}", c as char)))
    };

    digits
        .chunks(2)
        .map(|pair| {
            let high = nibble(pair[0])?;
            let low = match pair.get(1) {
                Some(&c) => nibble(c)?,
                None => 0,
            };
            Ok(high << 4 | low)
        })
        .collect()
}

fn fail(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Parse one PDF object.
///
/// A dictionary followed by `stream` is read as a stream using a direct
/// `/Length`; streams with an indirect length fall back to scanning for
/// `endstream` (see [`parse_object_with_length`]).
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_object_inner(input, None, 0)
}

/// Parse one PDF object, using `stream_length` for the stream payload when the
/// dictionary's `/Length` is an indirect reference already resolved by the
/// caller.
pub fn parse_object_with_length(
    input: &[u8],
    stream_length: Option<usize>,
) -> IResult<&[u8], Object> {
    parse_object_inner(input, stream_length, 0)
}

fn parse_object_inner(
    input: &[u8],
    stream_length: Option<usize>,
    depth: usize,
) -> IResult<&[u8], Object> {
    if depth > MAX_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }

    let (rest, tok) = token(input)?;

    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::LiteralString(raw) => Ok((rest, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex(raw) {
            Ok(bytes) => Ok((rest, Object::HexString(bytes))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::HexDigit,
            ))),
        },
        Token::Integer(i) => {
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if (0..=u32::MAX as i64).contains(&i) && (0..=u16::MAX as i64).contains(&gen) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(i as u32, gen as u16))));
                    }
                }
            }
            Ok((rest, Object::Integer(i)))
        },
        Token::ArrayStart => {
            let mut items = Vec::new();
            let mut cursor = rest;
            loop {
                if let Ok((after, Token::ArrayEnd)) = token(cursor) {
                    return Ok((after, Object::Array(items)));
                }
                let (after, item) = parse_object_inner(cursor, None, depth + 1)?;
                items.push(item);
                cursor = after;
            }
        },
        Token::DictStart => {
            let (after_dict, dict) = parse_dictionary_body(rest, depth)?;
            match token(after_dict) {
                Ok((after_kw, Token::StreamStart)) => {
                    let (after_stream, data) = parse_stream_data(after_kw, &dict, stream_length)?;
                    Ok((
                        after_stream,
                        Object::Stream {
                            dict,
                            data: bytes::Bytes::from(data),
                        },
                    ))
                },
                _ => Ok((after_dict, Object::Dictionary(dict))),
            }
        },
        _ => Err(fail(input, nom::error::ErrorKind::Tag)),
    }
}

fn parse_dictionary_body(input: &[u8], depth: usize) -> IResult<&[u8], Dictionary> {
    let mut dict = Dictionary::new();
    let mut cursor = input;
    loop {
        let (after_key, key) = token(cursor)?;
        match key {
            Token::DictEnd => return Ok((after_key, dict)),
            Token::Name(name) => {
                // A key directly followed by `>>` has no value; treat as null.
                if let Ok((after, Token::DictEnd)) = token(after_key) {
                    dict.insert(name, Object::Null);
                    return Ok((after, dict));
                }
                let (after_value, value) = parse_object_inner(after_key, None, depth + 1)?;
                dict.insert(name, value);
                cursor = after_value;
            },
            _ => return Err(fail(cursor, nom::error::ErrorKind::Tag)),
        }
    }
}

/// Read stream bytes after the `stream` keyword.
///
/// The keyword is followed by CRLF or LF (a lone CR is tolerated). The payload
/// length comes from a direct `/Length`, the caller's resolved length, or a
/// scan for `endstream` with one trailing end-of-line removed.
fn parse_stream_data<'a>(
    input: &'a [u8],
    dict: &Dictionary,
    resolved_length: Option<usize>,
) -> IResult<&'a [u8], Vec<u8>> {
    let body = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    let length = dict
        .get("Length")
        .and_then(Object::as_integer)
        .and_then(|len| usize::try_from(len).ok())
        .or(resolved_length);

    if let Some(length) = length {
        if length <= body.len() {
            let (after_ws, _) = skip_ws(&body[length..])?;
            if let Ok((rest, Token::StreamEnd)) = token(after_ws) {
                return Ok((rest, body[..length].to_vec()));
            }
        }
        log::debug!("Stream /Length {} does not land on endstream, scanning", length);
    }

    let pos = find_endstream(body).ok_or_else(|| fail(body, nom::error::ErrorKind::Eof))?;
    let mut end = pos;
    if end > 0 && body[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && body[end - 1] == b'\r' {
        end -= 1;
    }
    let rest = &body[pos + b"endstream".len()..];
    Ok((rest, body[..end].to_vec()))
}

fn find_endstream(input: &[u8]) -> Option<usize> {
    let keyword = b"endstream";
    input.windows(keyword.len()).position(|window| window == keyword)
}

/// Parse an indirect object `N G obj ... endobj`.
///
/// A missing `endobj` is tolerated. `stream_length` is forwarded to
/// [`parse_object_with_length`].
pub fn parse_indirect_object(
    input: &[u8],
    stream_length: Option<usize>,
) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, id) = token(input)?;
    let (rest, gen) = token(rest)?;
    let (rest, marker) = token(rest)?;

    let obj_ref = match (id, gen, marker) {
        (Token::Integer(id), Token::Integer(gen), Token::ObjStart)
            if (0..=u32::MAX as i64).contains(&id) && (0..=u16::MAX as i64).contains(&gen) =>
        {
            ObjectRef::new(id as u32, gen as u16)
        },
        _ => return Err(fail(input, nom::error::ErrorKind::Tag)),
    };

    let (rest, object) = parse_object_with_length(rest, stream_length)?;
    let rest = match token(rest) {
        Ok((after, Token::ObjEnd)) => after,
        _ => rest,
    };

    Ok((rest, (obj_ref, object)))
}

/// Convert a nom failure into a crate error carrying the byte offset
/// relative to `whole`.
pub fn to_parse_error(whole: &[u8], base: usize, err: nom::Err<nom::error::Error<&[u8]>>) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::ParseError {
            offset: base + whole.len(),
            reason: "unexpected end of input".to_string(),
        },
        nom::Err::Error(e) | nom::Err::Failure(e) => Error::ParseError {
            offset: base + (whole.len() - e.input.len()),
            reason: format!("{:?}", e.code),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(parse_object(b"null").unwrap().1, Object::Null);
        assert_eq!(parse_object(b"false").unwrap().1, Object::Boolean(false));
        assert_eq!(parse_object(b"12").unwrap().1, Object::Integer(12));
        assert_eq!(parse_object(b"/Sig").unwrap().1, Object::name("Sig"));
    }

    #[test]
    fn test_reference_vs_integers() {
        assert_eq!(
            parse_object(b"10 0 R").unwrap().1,
            Object::Reference(ObjectRef::new(10, 0))
        );
        let (rest, obj) = parse_object(b"0 612 792]").unwrap();
        assert_eq!(obj, Object::Integer(0));
        assert_eq!(rest, b" 612 792]");
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            parse_object(b"(Signed by\\: \\(x\\)\\101)").unwrap().1,
            Object::String(b"Signed by: (x)A".to_vec())
        );
        assert_eq!(parse_object(b"<4A6>").unwrap().1, Object::HexString(vec![0x4A, 0x60]));
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(decode_literal_string_escapes(b"ab\\\ncd"), b"abcd");
        assert_eq!(decode_literal_string_escapes(b"ab\r\ncd"), b"ab\ncd");
    }

    #[test]
    fn test_nested_dictionary() {
        let (_, obj) = parse_object(b"<< /Type /Page /Kids [1 0 R 2 0 R] /Res << /A 1 >> >>").unwrap();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Type"), Some(&Object::name("Page")));
        assert_eq!(dict.get("Kids").and_then(Object::as_array).map(Vec::len), Some(2));
        assert!(dict.get("Res").and_then(Object::as_dict).is_some());
    }

    #[test]
    fn test_stream_with_direct_length() {
        let input = b"<< /Length 5 >>\nstream\nab\ncdendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"ab\ncd"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_indirect_length_scans() {
        let input = b"<< /Length 8 0 R >>\r\nstream\r\nhello\r\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"hello"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_resolved_length_keeps_trailing_newline() {
        let input = b"<< /Length 8 0 R >>\nstream\nhello\n\nendstream";
        let (_, obj) = parse_object_with_length(input, Some(6)).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"hello\n"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_indirect_object() {
        let (rest, (obj_ref, obj)) =
            parse_indirect_object(b"3 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer", None).unwrap();
        assert_eq!(obj_ref, ObjectRef::new(3, 0));
        assert!(obj.has_type("Catalog"));
        assert_eq!(rest, b"\ntrailer");
    }

    #[test]
    fn test_unclosed_array_is_error() {
        assert!(parse_object(b"[1 2").is_err());
    }

    #[test]
    fn test_to_parse_error_offset() {
        let whole = b"   }";
        let err = parse_object(whole).unwrap_err();
        match to_parse_error(whole, 100, err) {
            Error::ParseError { offset, .. } => assert_eq!(offset, 103),
            other => panic!("unexpected {:?}", other),
        }
    }
}
