//! PDF tokenizer.
//!
//! Splits raw PDF bytes into [`Token`]s: numbers, literal and hex strings,
//! names, the `true`/`false`/`null` keywords, the `obj`/`endobj`/`stream`/
//! `endstream` markers, array and dictionary delimiters and the `R` reference
//! marker. Whitespace (space, `\t`, `\r`, `\n`, `\0`, `\f`) and `%` comments
//! between tokens are skipped.
//!
//! Escape sequences in literal strings are left for the parser; `#xx` escapes
//! in names are decoded here.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    sequence::{delimited, preceded},
    IResult,
};

/// Token types recognized by the lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g. 42, -123)
    Integer(i64),
    /// Real number (e.g. 3.14, -.5)
    Real(f64),
    /// Raw bytes between `(` and `)`, escapes not yet decoded
    LiteralString(&'a [u8]),
    /// Raw hex digits between `<` and `>`, whitespace included
    HexString(&'a [u8]),
    /// Name without the leading slash, `#xx` escapes decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R`
    R,
}

/// PDF whitespace characters.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip any run of whitespace and comments.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    let mut remaining = input;
    loop {
        if let Ok((rest, _)) = take_while1::<_, _, nom::error::Error<&[u8]>>(is_whitespace)(remaining)
        {
            remaining = rest;
        } else if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
        } else {
            return Ok((remaining, ()));
        }
    }
}

fn number_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
}

fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let start = input;
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(number_error(start));
    }

    let negative = sign == Some('-');
    match frac_part {
        Some(frac) => {
            let mut text = String::from(if negative { "-0" } else { "0" });
            if let Some(int) = int_part {
                text.push_str(std::str::from_utf8(int).map_err(|_| number_error(start))?);
            }
            text.push('.');
            if let Some(frac) = frac {
                text.push_str(std::str::from_utf8(frac).map_err(|_| number_error(start))?);
            }
            text.push('0');
            let real: f64 = text.parse().map_err(|_| number_error(start))?;
            Ok((input, Token::Real(real)))
        },
        None => {
            let digits = int_part.ok_or_else(|| number_error(start))?;
            let text = std::str::from_utf8(digits).map_err(|_| number_error(start))?;
            let magnitude: i64 = text.parse().map_err(|_| number_error(start))?;
            Ok((input, Token::Integer(if negative { -magnitude } else { magnitude })))
        },
    }
}

fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }
    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#xx` escapes in a raw name. Invalid escapes are kept literally.
///
/// Each decoded byte becomes the char with the same code point, so names
/// that are not UTF-8 survive a rewrite byte for byte.
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' {
            let decoded = raw
                .get(i + 1..i + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                bytes.push(byte);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    bytes.into_iter().map(char::from).collect()
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(
            take_while(|c: u8| !is_whitespace(c) && !is_delimiter(c)),
            |raw: &[u8]| Token::Name(decode_name_escapes(raw)),
        ),
    )(input)
}

/// Keywords must not run into a following regular character (`nullx`).
fn keyword<'a>(word: &'static str, tok: Token<'a>) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Token<'a>> {
    move |input: &'a [u8]| {
        let (rest, _) = tag(word)(input)?;
        match rest.first() {
            Some(&c) if !is_whitespace(c) && !is_delimiter(c) => {
                Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))
            },
            _ => Ok((rest, tok.clone())),
        }
    }
}

fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        keyword("false", Token::False),
        keyword("true", Token::True),
        keyword("null", Token::Null),
        keyword("obj", Token::ObjStart),
        keyword("endobj", Token::ObjEnd),
        keyword("endstream", Token::StreamEnd),
        keyword("stream", Token::StreamStart),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        keyword("R", Token::R),
    ))(input)
}

/// Parse a single token, skipping leading whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers() {
        assert_eq!(token(b"42").unwrap().1, Token::Integer(42));
        assert_eq!(token(b"-17 ").unwrap().1, Token::Integer(-17));
        assert_eq!(token(b"+5").unwrap().1, Token::Integer(5));
        assert_eq!(token(b"3.5").unwrap().1, Token::Real(3.5));
        assert_eq!(token(b"-.5").unwrap().1, Token::Real(-0.5));
        assert_eq!(token(b"4.").unwrap().1, Token::Real(4.0));
    }

    #[test]
    fn test_literal_string_with_nesting_and_escapes() {
        let (rest, tok) = token(b"(a (b) \\) c) tail").unwrap();
        assert_eq!(tok, Token::LiteralString(b"a (b) \\) c"));
        assert_eq!(rest, b" tail");
    }

    #[test]
    fn test_unbalanced_literal_string() {
        assert!(token(b"(never closed").is_err());
    }

    #[test]
    fn test_hex_string_vs_dict_start() {
        assert_eq!(token(b"<48 65>").unwrap().1, Token::HexString(b"48 65"));
        assert_eq!(token(b"<< /A 1 >>").unwrap().1, Token::DictStart);
    }

    #[test]
    fn test_names() {
        assert_eq!(token(b"/Type/Sig").unwrap().1, Token::Name("Type".to_string()));
        assert_eq!(token(b"/A#20B").unwrap().1, Token::Name("A B".to_string()));
        assert_eq!(token(b"/**********]").unwrap().1, Token::Name("**********".to_string()));
    }

    #[test]
    fn test_decode_name_escapes_keeps_invalid_sequences() {
        assert_eq!(decode_name_escapes(b"A#zzB"), "A#zzB");
        assert_eq!(decode_name_escapes(b"A#"), "A#");
        assert_eq!(decode_name_escapes(b"A#2"), "A#2");
    }

    #[test]
    fn test_decode_name_escapes_keeps_raw_bytes() {
        assert_eq!(decode_name_escapes(b"Caf#E9"), "Caf\u{e9}");
        assert_eq!(decode_name_escapes(b"F#28a#29"), "F(a)");
        assert_eq!(decode_name_escapes(b"\xC3\xA9"), "\u{c3}\u{a9}");
    }

    #[test]
    fn test_keywords_and_comments() {
        let (rest, tok) = token(b"  % comment\n true").unwrap();
        assert_eq!(tok, Token::True);
        assert!(rest.is_empty());
        assert_eq!(token(b"endobj").unwrap().1, Token::ObjEnd);
        assert_eq!(token(b"endstream").unwrap().1, Token::StreamEnd);
        assert_eq!(token(b"R ").unwrap().1, Token::R);
    }

    #[test]
    fn test_keyword_prefix_is_not_keyword() {
        assert!(token(b"nullx").is_err());
    }
}
