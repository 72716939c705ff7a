//! Lexer primitives: the building blocks every response parser is made of.
//!
//! All functions take the unconsumed suffix of one fully assembled response
//! line (literals already inlined by [`crate::frames`]) and return the
//! remaining suffix plus the parsed value. Failing with
//! [`ParseErrorKind::NoData`](crate::ParseErrorKind) means the grammar ran
//! off the end of the line.
//!
//! Parsing is deliberately liberal where servers are known to be sloppy:
//! quoted strings and literals may carry arbitrary octets, not just the
//! ASCII subset RFC 3501 promises.

use std::str::from_utf8;

use nom::{
    branch::alt,
    bytes::streaming::{escaped, tag, tag_no_case, take, take_while, take_while1},
    character::streaming::digit1,
    combinator::{map, map_res, opt},
    sequence::{delimited, terminated},
};

use crate::decode::{ParseErrorKind, ProtoParseError, ProtoResult};

/// How a string-ish token appeared on the wire.
///
/// Kept next to the decoded bytes so that values can be round-tripped and so
/// that `NIL`-vs-empty-string is never ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedAs {
    Atom,
    Quoted,
    Literal,
    Nil,
}

/// A value produced by the generic list parser: one of the four shapes that
/// can legally appear inside a parenthesized (or bracketed) list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Any {
    Num(u32),
    Bytes(Vec<u8>),
    List(Vec<Any>),
    Nil,
}

impl Any {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Any::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Any]> {
        match self {
            Any::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<u32> {
        match self {
            Any::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Lossy text rendition, for places that want a `String` no matter what.
    pub fn to_text(&self) -> String {
        match self {
            Any::Num(n) => n.to_string(),
            Any::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Any::List(items) => items
                .iter()
                .map(Any::to_text)
                .collect::<Vec<_>>()
                .join(" "),
            Any::Nil => String::new(),
        }
    }
}

// Nesting deeper than this in BODYSTRUCTURE or generic lists is treated as
// hostile input rather than mail.
pub(crate) const RECURSION_LIMIT: usize = 32;

// ----- numbers -----

/// `number = 1*DIGIT`
///
/// Unsigned 32-bit integer (0 <= n < 4,294,967,296)
pub fn number(input: &[u8]) -> ProtoResult<'_, u32> {
    map_res(
        // # Safety
        //
        // `unwrap` is safe because `1*DIGIT` contains ASCII-only characters.
        map(digit1, |val| from_utf8(val).unwrap()),
        str::parse::<u32>,
    )(input)
}

/// `number64 = 1*DIGIT`
///
/// Unsigned 63-bit integer, used by MODSEQ and HIGHESTMODSEQ.
pub fn number64(input: &[u8]) -> ProtoResult<'_, u64> {
    map_res(
        // # Safety
        //
        // `unwrap` is safe because `1*DIGIT` contains ASCII-only characters.
        map(digit1, |val| from_utf8(val).unwrap()),
        str::parse::<u64>,
    )(input)
}

/// `nz-number = digit-nz *DIGIT`
pub fn nz_number(input: &[u8]) -> ProtoResult<'_, u32> {
    let (remaining, value) = number(input)?;

    if value == 0 {
        return Err(ProtoParseError::failure(input, ParseErrorKind::BadNumber));
    }

    Ok((remaining, value))
}

// ----- atom -----

/// Bytes that terminate an atom.
///
/// The set follows the response grammar rather than the stricter command
/// grammar: `[` stays legal so that `BODY[1.2]` survives as one token, while
/// `]` terminates so that response codes can be delimited.
pub(crate) fn is_atom_char(byte: u8) -> bool {
    !(byte <= 0x1f
        || byte == 0x7f
        || matches!(
            byte,
            b'(' | b')' | b'{' | b' ' | b'%' | b'*' | b'"' | b'\\' | b']'
        ))
}

/// `atom = 1*ATOM-CHAR`
pub fn atom(input: &[u8]) -> ProtoResult<'_, &str> {
    let (remaining, parsed) = take_while1(is_atom_char)(input)?;

    // # Safety
    //
    // `unwrap` is safe because `is_atom_char` admits ASCII-only characters.
    Ok((remaining, from_utf8(parsed).unwrap()))
}

// ----- string -----

fn is_quoted_content(byte: u8) -> bool {
    !matches!(byte, b'"' | b'\\' | b'\r' | b'\n' | 0)
}

/// `quoted = DQUOTE *QUOTED-CHAR DQUOTE`
///
/// Only allocates beyond the copy-out when escaped characters need to be
/// replaced.
pub fn quoted(input: &[u8]) -> ProtoResult<'_, Vec<u8>> {
    let mut parser = delimited(
        tag(b"\""),
        map(
            opt(escaped(
                take_while1(is_quoted_content),
                '\\',
                nom::character::streaming::one_of("\\\""),
            )),
            Option::unwrap_or_default,
        ),
        tag(b"\""),
    );

    let (remaining, raw) = parser(input)?;

    Ok((remaining, unescape_quoted(raw)))
}

fn unescape_quoted(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut escaped = false;

    for &byte in raw {
        if escaped {
            out.push(byte);
            escaped = false;
        } else if byte == b'\\' {
            escaped = true;
        } else {
            out.push(byte);
        }
    }

    out
}

/// `literal = "{" number ["+"] "}" CRLF *CHAR8`
///
/// The literal content is expected to be present in full; the frame
/// assembler guarantees that before a line reaches any parser.
pub fn literal(input: &[u8]) -> ProtoResult<'_, Vec<u8>> {
    let (remaining, length) = terminated(
        delimited(tag(b"{"), terminated(number, opt(tag(b"+"))), tag(b"}")),
        tag(b"\r\n"),
    )(input)?;

    let (remaining, data) = take(length)(remaining)?;

    Ok((remaining, data.to_vec()))
}

/// `literal8 = "~{" number "}" CRLF *OCTET` (RFC 3516)
pub fn literal8(input: &[u8]) -> ProtoResult<'_, Vec<u8>> {
    let (remaining, _) = tag(b"~")(input)?;

    literal(remaining)
}

/// `string = quoted / literal`
pub fn string(input: &[u8]) -> ProtoResult<'_, (Vec<u8>, ParsedAs)> {
    alt((
        map(quoted, |data| (data, ParsedAs::Quoted)),
        map(literal, |data| (data, ParsedAs::Literal)),
    ))(input)
}

/// `astring = 1*ASTRING-CHAR / string`
pub fn astring(input: &[u8]) -> ProtoResult<'_, (Vec<u8>, ParsedAs)> {
    match input.first() {
        Some(b'"') | Some(b'{') => string(input),
        Some(_) => map(atom, |val| (val.as_bytes().to_vec(), ParsedAs::Atom))(input),
        None => Err(nom::Err::Incomplete(nom::Needed::Unknown)),
    }
}

/// `nil = "NIL"`
pub fn nil(input: &[u8]) -> ProtoResult<'_, &[u8]> {
    tag_no_case(b"NIL")(input)
}

/// `nstring = string / nil`
///
/// Parsed as an `astring` first: only the bare atom `NIL` (any case) maps
/// to absence, a quoted or literal `"NIL"` stays a string.
pub fn nstring(input: &[u8]) -> ProtoResult<'_, Option<Vec<u8>>> {
    let (remaining, (data, form)) = astring(input)?;

    if form == ParsedAs::Atom && data.eq_ignore_ascii_case(b"NIL") {
        Ok((remaining, None))
    } else {
        Ok((remaining, Some(data)))
    }
}

// ----- mailbox -----

/// `mailbox = "INBOX" / astring`
///
/// `INBOX` is case-folded to its canonical spelling; every other name is
/// decoded from the server's modified UTF-7.
pub fn mailbox(input: &[u8]) -> ProtoResult<'_, String> {
    let (remaining, (raw, form)) = astring(input)?;

    let name = if form == ParsedAs::Atom && raw.eq_ignore_ascii_case(b"INBOX") {
        String::from("INBOX")
    } else {
        utf7_imap::decode_utf7_imap(String::from_utf8_lossy(&raw).into_owned())
    };

    Ok((remaining, name))
}

// ----- generic lists -----

/// `( ... )` of [`Any`] values separated by single spaces.
pub fn plist(input: &[u8]) -> ProtoResult<'_, Vec<Any>> {
    parse_list(b'(', b')', input, 0)
}

/// `[ ... ]` of [`Any`] values separated by single spaces.
pub fn blist(input: &[u8]) -> ProtoResult<'_, Vec<Any>> {
    parse_list(b'[', b']', input, 0)
}

fn parse_list(open: u8, close: u8, input: &[u8], depth: usize) -> ProtoResult<'_, Vec<Any>> {
    if depth > RECURSION_LIMIT {
        return Err(ProtoParseError::failure(
            input,
            ParseErrorKind::RecursionLimitExceeded,
        ));
    }

    let Some(&first) = input.first() else {
        return Err(nom::Err::Incomplete(nom::Needed::Unknown));
    };
    if first != open {
        return Err(ProtoParseError::failure(
            input,
            ParseErrorKind::UnexpectedHere,
        ));
    }

    let mut remaining = &input[1..];
    let mut items = Vec::new();

    loop {
        match remaining.first() {
            None => return Err(nom::Err::Incomplete(nom::Needed::Unknown)),
            Some(&byte) if byte == close => return Ok((&remaining[1..], items)),
            Some(b' ') => remaining = &remaining[1..],
            Some(_) => {
                let (rest, value) = any_at_depth(remaining, depth + 1)?;
                items.push(value);
                remaining = rest;
            }
        }
    }
}

/// One value of any shape: a nested list, a string, `NIL`, a number, a
/// backslashed flag, or a bare atom.
///
/// Two token-level warts of the response grammar are absorbed here, exactly
/// as servers produce them:
///
/// * `BODY[...]` and friends contain `[` with no surrounding whitespace; the
///   whole bracketed expression (plus an optional `<origin>` suffix) is
///   spliced back into one atom;
/// * `\*` is a valid "flag" even though `*` terminates atoms.
pub fn any(input: &[u8]) -> ProtoResult<'_, Any> {
    any_at_depth(input, 0)
}

fn any_at_depth(input: &[u8], depth: usize) -> ProtoResult<'_, Any> {
    if depth > RECURSION_LIMIT {
        return Err(ProtoParseError::failure(
            input,
            ParseErrorKind::RecursionLimitExceeded,
        ));
    }

    match input.first() {
        None => Err(nom::Err::Incomplete(nom::Needed::Unknown)),
        Some(b'[') => map(
            |i| parse_list(b'[', b']', i, depth),
            Any::List,
        )(input),
        Some(b'(') => map(
            |i| parse_list(b'(', b')', i, depth),
            Any::List,
        )(input),
        Some(b'"') | Some(b'{') => map(string, |(data, _)| Any::Bytes(data))(input),
        Some(b'\\') => {
            let remaining = &input[1..];
            match remaining.first() {
                None => Err(nom::Err::Incomplete(nom::Needed::Unknown)),
                Some(b'*') => Ok((&remaining[1..], Any::Bytes(b"\\*".to_vec()))),
                Some(_) => {
                    let (rest, name) = atom(remaining)?;
                    let mut flag = Vec::with_capacity(name.len() + 1);
                    flag.push(b'\\');
                    flag.extend_from_slice(name.as_bytes());
                    Ok((rest, Any::Bytes(flag)))
                }
            }
        }
        Some(byte) if byte.is_ascii_digit() => map(number, Any::Num)(input),
        Some(_) => {
            if input.len() >= 3 && input[..3].eq_ignore_ascii_case(b"NIL") {
                return Ok((&input[3..], Any::Nil));
            }

            let (mut remaining, name) = atom(input)?;
            let mut token = name.as_bytes().to_vec();

            if token.contains(&b'[') {
                // "BODY[something]": no whitespace between "[" and the rest.
                let (rest, bracketed) =
                    terminated(take_while(|b| b != b']'), tag(b"]"))(remaining)?;
                token.extend_from_slice(bracketed);
                token.push(b']');
                remaining = rest;

                if remaining.first() == Some(&b'<') {
                    let (rest, origin) =
                        terminated(take_while(|b| b != b'>'), tag(b">"))(remaining)?;
                    token.push(b'<');
                    token.extend_from_slice(origin);
                    token.push(b'>');
                    remaining = rest;
                }
            }

            Ok((remaining, Any::Bytes(token)))
        }
    }
}

// ----- whitespace -----

/// Zero or more spaces. Single-space separation is the rule, but responses
/// from real servers are treated charitably.
pub fn eat_spaces(input: &[u8]) -> ProtoResult<'_, &[u8]> {
    take_while(|b| b == b' ')(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number() {
        assert!(number(b"").is_err());
        assert!(number(b"?").is_err());

        let (rem, val) = number(b"123 ").unwrap();
        assert_eq!(val, 123);
        assert_eq!(rem, b" ");

        assert!(number(b"99999999999999999999 ").is_err());
    }

    #[test]
    fn test_nz_number() {
        assert!(nz_number(b"0 ").is_err());
        assert!(nz_number(b"55 ").is_ok());
    }

    #[test]
    fn test_atom() {
        assert!(atom(b" x").is_err());

        let (rem, val) = atom(b"a(").unwrap();
        assert_eq!(val, "a");
        assert_eq!(rem, b"(");

        let (rem, val) = atom(b"xxx yyy").unwrap();
        assert_eq!(val, "xxx");
        assert_eq!(rem, b" yyy");

        // ']' terminates, '[' does not
        let (rem, val) = atom(b"BODY[1.2] x").unwrap();
        assert_eq!(val, "BODY[1.2");
        assert_eq!(rem, b"] x");
    }

    #[test]
    fn test_quoted() {
        let (rem, val) = quoted(br#""Hello"???"#).unwrap();
        assert_eq!(rem, b"???");
        assert_eq!(val, b"Hello");

        let (rem, val) = quoted(br#""Hello \"World\""???"#).unwrap();
        assert_eq!(rem, b"???");
        assert_eq!(val, br#"Hello "World""#);

        let (_, val) = quoted(br#""" "#).unwrap();
        assert_eq!(val, b"");

        assert!(quoted(b"\"broken\r\n\"").is_err());
        assert!(matches!(quoted(br#""unterminated"#), Err(nom::Err::Incomplete(_))));
    }

    #[test]
    fn test_literal() {
        let (rem, val) = literal(b"{3}\r\n123xxx").unwrap();
        assert_eq!(val, b"123");
        assert_eq!(rem, b"xxx");

        // non-synchronizing form
        let (_, val) = literal(b"{3+}\r\nabc").unwrap();
        assert_eq!(val, b"abc");

        assert!(matches!(
            literal(b"{10}\r\nshort"),
            Err(nom::Err::Incomplete(_))
        ));
    }

    #[test]
    fn test_nstring() {
        let (_, val) = nstring(b"NIL ").unwrap();
        assert_eq!(val, None);

        let (_, val) = nstring(b"nil ").unwrap();
        assert_eq!(val, None);

        let (_, val) = nstring(b"\"NIL\" ").unwrap();
        assert_eq!(val, Some(b"NIL".to_vec()));

        let (_, val) = nstring(b"{3}\r\nNIL ").unwrap();
        assert_eq!(val, Some(b"NIL".to_vec()));
    }

    #[test]
    fn test_mailbox() {
        let (_, val) = mailbox(b"iNbOx ").unwrap();
        assert_eq!(val, "INBOX");

        let (_, val) = mailbox(b"\"iNbOx\" ").unwrap();
        // A quoted "iNbOx" is still INBOX per RFC 3501, but the original
        // grammar only folds the atom form; mirror that.
        assert_eq!(val, "iNbOx");

        let (_, val) = mailbox(b"~peter/mail/&U,BTFw-/&ZeVnLIqe- ").unwrap();
        assert_eq!(val, "~peter/mail/\u{53f0}\u{5317}/\u{65e5}\u{672c}\u{8a9e}");
    }

    #[test]
    fn test_plist_simple() {
        let (rem, val) = plist(b"(1 2 3) tail").unwrap();
        assert_eq!(val, vec![Any::Num(1), Any::Num(2), Any::Num(3)]);
        assert_eq!(rem, b" tail");

        let (_, val) = plist(b"()").unwrap();
        assert!(val.is_empty());
    }

    #[test]
    fn test_plist_nested() {
        let (_, val) = plist(b"(a (b NIL) \"c d\")").unwrap();
        assert_eq!(
            val,
            vec![
                Any::Bytes(b"a".to_vec()),
                Any::List(vec![Any::Bytes(b"b".to_vec()), Any::Nil]),
                Any::Bytes(b"c d".to_vec()),
            ]
        );
    }

    #[test]
    fn test_any_flags() {
        let (_, val) = plist(br"(\Seen \Deleted \*)").unwrap();
        assert_eq!(
            val,
            vec![
                Any::Bytes(b"\\Seen".to_vec()),
                Any::Bytes(b"\\Deleted".to_vec()),
                Any::Bytes(b"\\*".to_vec()),
            ]
        );
    }

    #[test]
    fn test_any_body_section_splice() {
        let (rem, val) = any(b"BODY[HEADER.FIELDS (REFERENCES)]<0> rest").unwrap();
        assert_eq!(val, Any::Bytes(b"BODY[HEADER.FIELDS (REFERENCES)]<0>".to_vec()));
        assert_eq!(rem, b" rest");
    }

    #[test]
    fn test_recursion_limit() {
        let mut hostile = Vec::new();
        hostile.extend(std::iter::repeat(b'(').take(64));
        hostile.extend(std::iter::repeat(b')').take(64));
        assert!(plist(&hostile).is_err());
    }
}
