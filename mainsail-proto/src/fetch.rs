//! FETCH response data items (`msg-att`).

use chrono::{DateTime, FixedOffset};
use nom::{
    branch::alt,
    bytes::streaming::{tag, take_while},
    combinator::{map, opt},
    sequence::{delimited, terminated},
};

use crate::{
    body::{body, BodyStructure},
    core::{atom, eat_spaces, literal8, nstring, number, number64},
    datetime::date_time,
    decode::{ParseErrorKind, ProtoParseError, ProtoResult},
    envelope::{envelope, Envelope},
    flag::flag_list,
};

/// A `BODY[...]` / `BINARY[...]` data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionData {
    /// `BINARY` rather than `BODY`: the payload is already
    /// transfer-decoded by the server.
    pub binary: bool,
    /// The uppercased section specifier between the brackets, e.g. `1.2`,
    /// `HEADER`, `2.MIME`, `HEADER.FIELDS (REFERENCES LIST-POST)`. Empty
    /// for `BODY[]`.
    pub section: String,
    /// `<n>` origin octet, when the reply is a partial one.
    pub origin: Option<u32>,
    pub data: Option<Vec<u8>>,
}

/// One element of a FETCH response.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    Uid(u32),
    Flags(Vec<String>),
    ModSeq(u64),
    Envelope(Envelope),
    InternalDate(DateTime<FixedOffset>),
    Rfc822Size(u32),
    BodyStructure(BodyStructure),
    Section(SectionData),
    /// Anything we do not model, kept verbatim so the session is never
    /// silently corrupted.
    Other { name: String, data: Option<Vec<u8>> },
}

impl FetchItem {
    /// The wire identifier this item was keyed under.
    pub fn name(&self) -> String {
        match self {
            FetchItem::Uid(_) => String::from("UID"),
            FetchItem::Flags(_) => String::from("FLAGS"),
            FetchItem::ModSeq(_) => String::from("MODSEQ"),
            FetchItem::Envelope(_) => String::from("ENVELOPE"),
            FetchItem::InternalDate(_) => String::from("INTERNALDATE"),
            FetchItem::Rfc822Size(_) => String::from("RFC822.SIZE"),
            FetchItem::BodyStructure(_) => String::from("BODYSTRUCTURE"),
            FetchItem::Section(section) => {
                let kind = if section.binary { "BINARY" } else { "BODY" };
                format!("{kind}[{}]", section.section)
            }
            FetchItem::Other { name, .. } => name.clone(),
        }
    }
}

/// An untagged `* n FETCH (...)` response.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Sequence number, 1-based.
    pub seq: u32,
    pub items: Vec<FetchItem>,
}

impl FetchResponse {
    pub fn uid(&self) -> Option<u32> {
        self.items.iter().find_map(|item| match item {
            FetchItem::Uid(uid) => Some(*uid),
            _ => None,
        })
    }

    pub fn flags(&self) -> Option<&[String]> {
        self.items.iter().find_map(|item| match item {
            FetchItem::Flags(flags) => Some(flags.as_slice()),
            _ => None,
        })
    }
}

/// The identifier of one msg-att item.
///
/// Identifiers carrying a section (`BODY[...]`, `BINARY[...]`) may contain
/// spaces inside the brackets, so plain atom parsing is not enough; the
/// bracketed stretch is spliced on, then an optional `<origin>`.
fn item_identifier(input: &[u8]) -> ProtoResult<'_, (String, Option<u32>)> {
    let (mut remaining, name) = atom(input)?;
    let mut identifier = name.to_ascii_uppercase();
    let mut origin = None;

    if identifier.contains('[') {
        let (rest, bracketed) = terminated(take_while(|b| b != b']'), tag(b"]"))(remaining)?;
        identifier.push_str(&String::from_utf8_lossy(bracketed).to_ascii_uppercase());
        identifier.push(']');
        remaining = rest;

        let (rest, parsed_origin) =
            opt(delimited(tag(b"<"), number, tag(b">")))(remaining)?;
        origin = parsed_origin;
        remaining = rest;
    }

    Ok((remaining, (identifier, origin)))
}

fn item_for<'a>(
    identifier: &str,
    origin: Option<u32>,
    input: &'a [u8],
) -> ProtoResult<'a, FetchItem> {
    match identifier {
        "UID" => map(number, FetchItem::Uid)(input),
        "FLAGS" => map(flag_list, FetchItem::Flags)(input),
        "MODSEQ" => map(
            delimited(tag(b"("), number64, tag(b")")),
            FetchItem::ModSeq,
        )(input),
        "ENVELOPE" => map(envelope, FetchItem::Envelope)(input),
        "INTERNALDATE" => map(date_time, FetchItem::InternalDate)(input),
        "RFC822.SIZE" => map(number, FetchItem::Rfc822Size)(input),
        "BODY" | "BODYSTRUCTURE" => map(body, FetchItem::BodyStructure)(input),
        _ => {
            if let Some(section) = identifier
                .strip_prefix("BODY[")
                .and_then(|s| s.strip_suffix(']'))
            {
                map(nstring, |data| {
                    FetchItem::Section(SectionData {
                        binary: false,
                        section: section.to_owned(),
                        origin,
                        data,
                    })
                })(input)
            } else if let Some(section) = identifier
                .strip_prefix("BINARY[")
                .and_then(|s| s.strip_suffix(']'))
            {
                map(
                    alt((map(literal8, Some), nstring)),
                    |data| {
                        FetchItem::Section(SectionData {
                            binary: true,
                            section: section.to_owned(),
                            origin,
                            data,
                        })
                    },
                )(input)
            } else {
                map(nstring, |data| FetchItem::Other {
                    name: identifier.to_owned(),
                    data,
                })(input)
            }
        }
    }
}

/// `msg-att = "(" (msg-att-dynamic / msg-att-static)
///            *(SP (msg-att-dynamic / msg-att-static)) ")"`
pub fn msg_att(input: &[u8]) -> ProtoResult<'_, Vec<FetchItem>> {
    let (mut remaining, _) = tag(b"(")(input)?;
    let mut items: Vec<FetchItem> = Vec::new();

    loop {
        let (rest, _) = eat_spaces(remaining)?;
        remaining = rest;

        match remaining.first() {
            None => return Err(nom::Err::Incomplete(nom::Needed::Unknown)),
            Some(b')') => return Ok((&remaining[1..], items)),
            Some(_) => {
                let (rest, (identifier, origin)) = item_identifier(remaining)?;

                if items.iter().any(|item| item.name() == identifier) {
                    return Err(ProtoParseError::failure(
                        remaining,
                        ParseErrorKind::UnexpectedHere,
                    ));
                }

                let (rest, _) = eat_spaces(rest)?;
                let (rest, item) = item_for(&identifier, origin, rest)?;
                items.push(item);
                remaining = rest;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_and_uid() {
        let (rem, items) = msg_att(b"(UID 42 FLAGS (\\Seen custom))x").unwrap();
        assert_eq!(rem, b"x");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], FetchItem::Uid(42));
        assert_eq!(
            items[1],
            FetchItem::Flags(vec!["\\Seen".into(), "custom".into()])
        );
    }

    #[test]
    fn test_modseq() {
        let (_, items) = msg_att(b"(MODSEQ (624140003))x").unwrap();
        assert_eq!(items, vec![FetchItem::ModSeq(624_140_003)]);
    }

    #[test]
    fn test_body_section_with_literal() {
        let (_, items) = msg_att(b"(BODY[1] {5}\r\nhello)x").unwrap();
        match &items[0] {
            FetchItem::Section(section) => {
                assert!(!section.binary);
                assert_eq!(section.section, "1");
                assert_eq!(section.data.as_deref(), Some(b"hello".as_ref()));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_header_fields_section() {
        let (_, items) =
            msg_att(b"(BODY[HEADER.FIELDS (References List-Post)] \"x\")y").unwrap();
        match &items[0] {
            FetchItem::Section(section) => {
                assert_eq!(section.section, "HEADER.FIELDS (REFERENCES LIST-POST)");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_binary_literal8() {
        let (_, items) = msg_att(b"(BINARY[2] ~{4}\r\n\x00\x01\x02\x03)x").unwrap();
        match &items[0] {
            FetchItem::Section(section) => {
                assert!(section.binary);
                assert_eq!(section.data.as_deref(), Some(&[0u8, 1, 2, 3][..]));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_item_preserved() {
        let (_, items) = msg_att(b"(X-GM-MSGID \"1278455344230334865\")x").unwrap();
        assert_eq!(
            items,
            vec![FetchItem::Other {
                name: "X-GM-MSGID".into(),
                data: Some(b"1278455344230334865".to_vec()),
            }]
        );
    }

    #[test]
    fn test_duplicate_item_rejected() {
        assert!(msg_att(b"(UID 1 UID 2)x").is_err());
    }

}
