//! BODYSTRUCTURE: the recursive description of a message's MIME tree.
//!
//! The grammar is RFC 3501's `body`, parsed with a recursion limit and a
//! liberal attitude towards the `NIL`s real servers sprinkle where the RFC
//! wants strings.

use abnf_core::streaming::sp;
use nom::{
    branch::alt,
    bytes::streaming::tag,
    combinator::{map, opt},
    multi::{many0, many1, separated_list0},
    sequence::{delimited, preceded, tuple},
};
use serde::{Deserialize, Serialize};

use crate::{
    core::{any, eat_spaces, nil, nstring, number, RECURSION_LIMIT},
    decode::{ParseErrorKind, ProtoParseError, ProtoResult},
    envelope::{envelope, Envelope},
};

/// `body-fld-param`, kept in wire order.
pub type ParamList = Vec<(String, String)>;

/// The fields shared by every non-multipart body part.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BasicFields {
    /// Media type, lowercased (`text`, `image`, ...).
    pub media_type: String,
    /// Media subtype, lowercased (`plain`, `jpeg`, ...).
    pub media_subtype: String,
    pub params: ParamList,
    pub body_fld_id: Option<String>,
    pub description: Option<String>,
    /// Content-Transfer-Encoding, lowercased (`7bit`, `base64`, ...).
    pub transfer_encoding: String,
    pub octets: u32,
}

impl BasicFields {
    /// `type/subtype`
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.media_type, self.media_subtype)
    }

    /// Case-insensitive parameter lookup.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// `body-fld-dsp`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Disposition {
    pub kind: String,
    pub params: ParamList,
}

/// `body-ext-1part` / the tail of `body-ext-mpart`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtensionFields {
    pub md5: Option<String>,
    pub disposition: Option<Disposition>,
    pub language: Vec<String>,
    pub location: Option<String>,
}

/// One node of the parsed BODYSTRUCTURE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyStructure {
    Text {
        fields: BasicFields,
        n_lines: u32,
        ext: ExtensionFields,
    },
    Basic {
        fields: BasicFields,
        ext: ExtensionFields,
    },
    /// `message/rfc822`: an embedded message with its own envelope and body.
    Message {
        fields: BasicFields,
        envelope: Box<Envelope>,
        body: Box<BodyStructure>,
        n_lines: u32,
        ext: ExtensionFields,
    },
    Multipart {
        parts: Vec<BodyStructure>,
        media_subtype: String,
        params: ParamList,
        ext: ExtensionFields,
    },
}

impl BodyStructure {
    /// `type/subtype` of this node.
    pub fn mime_type(&self) -> String {
        match self {
            BodyStructure::Text { fields, .. }
            | BodyStructure::Basic { fields, .. }
            | BodyStructure::Message { fields, .. } => fields.mime_type(),
            BodyStructure::Multipart { media_subtype, .. } => {
                format!("multipart/{media_subtype}")
            }
        }
    }
}

fn lossy(value: Option<Vec<u8>>) -> Option<String> {
    value.map(|b| String::from_utf8_lossy(&b).into_owned())
}

/// `body-fld-param = "(" string SP string *(SP string SP string) ")" / nil`
///
/// `NIL` in value position is accepted as an empty value.
fn body_fld_param(input: &[u8]) -> ProtoResult<'_, ParamList> {
    alt((
        map(nil, |_| Vec::new()),
        map(
            delimited(
                tag(b"("),
                separated_list0(sp, nstring),
                preceded(eat_spaces, tag(b")")),
            ),
            |items| {
                items
                    .chunks(2)
                    .filter_map(|pair| match pair {
                        [key, value] => Some((
                            lossy(key.clone()).unwrap_or_default(),
                            lossy(value.clone()).unwrap_or_default(),
                        )),
                        _ => None,
                    })
                    .collect()
            },
        ),
    ))(input)
}

/// `body-fields = body-fld-param SP body-fld-id SP body-fld-desc SP
///                body-fld-enc SP body-fld-octets`
fn body_fields(input: &[u8]) -> ProtoResult<'_, (ParamList, Option<String>, Option<String>, String, u32)> {
    let (remaining, (params, _, id, _, description, _, encoding, _, octets)) = tuple((
        body_fld_param,
        sp,
        nstring,
        sp,
        nstring,
        sp,
        // body-fld-enc is a string, but NIL happens in the wild
        nstring,
        sp,
        number,
    ))(input)?;

    Ok((
        remaining,
        (
            params,
            lossy(id),
            lossy(description),
            lossy(encoding).unwrap_or_default().to_ascii_lowercase(),
            octets,
        ),
    ))
}

/// `body-fld-dsp = "(" string SP body-fld-param ")" / nil`
fn body_fld_dsp(input: &[u8]) -> ProtoResult<'_, Option<Disposition>> {
    alt((
        map(nil, |_| None),
        map(
            delimited(
                tag(b"("),
                tuple((nstring, sp, body_fld_param)),
                tag(b")"),
            ),
            |(kind, _, params)| {
                Some(Disposition {
                    kind: lossy(kind).unwrap_or_default().to_ascii_lowercase(),
                    params,
                })
            },
        ),
    ))(input)
}

/// `body-fld-lang = nstring / "(" string *(SP string) ")"`
fn body_fld_lang(input: &[u8]) -> ProtoResult<'_, Vec<String>> {
    alt((
        map(
            delimited(tag(b"("), separated_list0(sp, nstring), tag(b")")),
            |items| items.into_iter().filter_map(lossy).collect(),
        ),
        map(nstring, |item| lossy(item).into_iter().collect()),
    ))(input)
}

/// The `[SP body-fld-dsp [SP body-fld-lang [SP body-fld-loc
/// *(SP body-extension)]]]` tail shared by both extension forms.
///
/// Trailing `body-extension` values are parsed and dropped.
fn extension_tail<'a>(input: &'a [u8], ext: &mut ExtensionFields) -> ProtoResult<'a, ()> {
    let (input, dsp) = opt(preceded(sp, body_fld_dsp))(input)?;
    let Some(dsp) = dsp else {
        return Ok((input, ()));
    };
    ext.disposition = dsp;

    let (input, lang) = opt(preceded(sp, body_fld_lang))(input)?;
    let Some(lang) = lang else {
        return Ok((input, ()));
    };
    ext.language = lang;

    let (input, loc) = opt(preceded(sp, nstring))(input)?;
    let Some(loc) = loc else {
        return Ok((input, ()));
    };
    ext.location = lossy(loc);

    let (input, _) = many0(preceded(sp, any))(input)?;
    Ok((input, ()))
}

/// `body-ext-1part = body-fld-md5 [...]`
fn body_ext_1part(input: &[u8]) -> ProtoResult<'_, ExtensionFields> {
    let mut ext = ExtensionFields::default();

    let (input, md5) = nstring(input)?;
    ext.md5 = lossy(md5);

    let (input, ()) = extension_tail(input, &mut ext)?;
    Ok((input, ext))
}

/// `body-ext-mpart = body-fld-param [...]`
fn body_ext_mpart(input: &[u8]) -> ProtoResult<'_, (ParamList, ExtensionFields)> {
    let mut ext = ExtensionFields::default();

    let (input, params) = body_fld_param(input)?;

    let (input, ()) = extension_tail(input, &mut ext)?;
    Ok((input, (params, ext)))
}

/// `body = "(" (body-type-1part / body-type-mpart) ")"`
pub fn body(input: &[u8]) -> ProtoResult<'_, BodyStructure> {
    body_at_depth(input, 0)
}

fn body_at_depth(input: &[u8], depth: usize) -> ProtoResult<'_, BodyStructure> {
    if depth > RECURSION_LIMIT {
        return Err(ProtoParseError::failure(
            input,
            ParseErrorKind::RecursionLimitExceeded,
        ));
    }

    let (remaining, _) = tag(b"(")(input)?;

    let (remaining, parsed) = if remaining.first() == Some(&b'(') {
        body_type_mpart(remaining, depth)?
    } else {
        body_type_1part(remaining, depth)?
    };

    let (remaining, _) = preceded(eat_spaces, tag(b")"))(remaining)?;

    Ok((remaining, parsed))
}

/// `body-type-mpart = 1*body SP media-subtype [SP body-ext-mpart]`
fn body_type_mpart(input: &[u8], depth: usize) -> ProtoResult<'_, BodyStructure> {
    // bodies are adjacent per the RFC; a stray space between them is accepted
    let (input, parts) = many1(preceded(eat_spaces, |i| body_at_depth(i, depth + 1)))(input)?;
    let (input, subtype) = preceded(sp, nstring)(input)?;
    let (input, ext) = opt(preceded(sp, body_ext_mpart))(input)?;

    let (params, ext) = ext.unwrap_or_default();

    Ok((
        input,
        BodyStructure::Multipart {
            parts,
            media_subtype: lossy(subtype).unwrap_or_default().to_ascii_lowercase(),
            params,
            ext,
        },
    ))
}

/// `body-type-1part = (body-type-basic / body-type-msg / body-type-text)
///                    [SP body-ext-1part]`
fn body_type_1part(input: &[u8], depth: usize) -> ProtoResult<'_, BodyStructure> {
    let (input, (media_type, _, media_subtype, _)) =
        tuple((nstring, sp, nstring, sp))(input)?;

    let media_type = lossy(media_type).unwrap_or_default().to_ascii_lowercase();
    let media_subtype = lossy(media_subtype).unwrap_or_default().to_ascii_lowercase();

    let (input, (params, id, description, encoding, octets)) = body_fields(input)?;

    let fields = BasicFields {
        media_type,
        media_subtype,
        params,
        body_fld_id: id,
        description,
        transfer_encoding: encoding,
        octets,
    };

    let is_message = fields.media_type == "message" && fields.media_subtype == "rfc822";
    let is_text = fields.media_type == "text";

    if is_message {
        // body-type-msg, but fall back to the basic branch when the
        // envelope/body/lines tail is missing (some servers elide it)
        let msg = tuple((
            preceded(sp, envelope),
            preceded(sp, |i| body_at_depth(i, depth + 1)),
            preceded(sp, number),
        ));

        let (input, tail) = opt(msg)(input)?;
        if let Some((env, sub, n_lines)) = tail {
            let (input, ext) = opt(preceded(sp, body_ext_1part))(input)?;
            return Ok((
                input,
                BodyStructure::Message {
                    fields,
                    envelope: Box::new(env),
                    body: Box::new(sub),
                    n_lines,
                    ext: ext.unwrap_or_default(),
                },
            ));
        }

        let (input, ext) = opt(preceded(sp, body_ext_1part))(input)?;
        return Ok((
            input,
            BodyStructure::Basic {
                fields,
                ext: ext.unwrap_or_default(),
            },
        ));
    }

    if is_text {
        let (input, n_lines) = preceded(sp, number)(input)?;
        let (input, ext) = opt(preceded(sp, body_ext_1part))(input)?;
        return Ok((
            input,
            BodyStructure::Text {
                fields,
                n_lines,
                ext: ext.unwrap_or_default(),
            },
        ));
    }

    let (input, ext) = opt(preceded(sp, body_ext_1part))(input)?;
    Ok((
        input,
        BodyStructure::Basic {
            fields,
            ext: ext.unwrap_or_default(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_text() {
        let wire = b"(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 1152 23)x";
        let (rem, parsed) = body(wire).unwrap();
        assert_eq!(rem, b"x");

        match parsed {
            BodyStructure::Text { fields, n_lines, .. } => {
                assert_eq!(fields.mime_type(), "text/plain");
                assert_eq!(fields.param("charset"), Some("US-ASCII"));
                assert_eq!(fields.transfer_encoding, "7bit");
                assert_eq!(fields.octets, 1152);
                assert_eq!(n_lines, 23);
            }
            other => panic!("not text: {other:?}"),
        }
    }

    #[test]
    fn test_single_with_extension() {
        let wire = b"(\"APPLICATION\" \"PDF\" (\"NAME\" \"x.pdf\") NIL NIL \"BASE64\" 1024 \"md5md5\" (\"ATTACHMENT\" (\"FILENAME\" \"x.pdf\")) NIL NIL)x";
        let (_, parsed) = body(wire).unwrap();

        match parsed {
            BodyStructure::Basic { fields, ext } => {
                assert_eq!(fields.mime_type(), "application/pdf");
                assert_eq!(ext.md5.as_deref(), Some("md5md5"));
                let dsp = ext.disposition.unwrap();
                assert_eq!(dsp.kind, "attachment");
                assert_eq!(dsp.params, vec![("FILENAME".into(), "x.pdf".into())]);
            }
            other => panic!("not basic: {other:?}"),
        }
    }

    #[test]
    fn test_multipart() {
        let wire = b"((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1)(\"TEXT\" \"HTML\" NIL NIL NIL \"8BIT\" 20 1) \"ALTERNATIVE\" (\"BOUNDARY\" \"b1\") NIL NIL)x";
        let (_, parsed) = body(wire).unwrap();

        match parsed {
            BodyStructure::Multipart {
                parts,
                media_subtype,
                params,
                ..
            } => {
                assert_eq!(parts.len(), 2);
                assert_eq!(media_subtype, "alternative");
                assert_eq!(params, vec![("BOUNDARY".into(), "b1".into())]);
                assert_eq!(parts[1].mime_type(), "text/html");
            }
            other => panic!("not multipart: {other:?}"),
        }
    }

    #[test]
    fn test_message_rfc822() {
        let wire = b"(\"MESSAGE\" \"RFC822\" NIL NIL NIL \"7BIT\" 320 (NIL \"inner\" NIL NIL NIL NIL NIL NIL NIL NIL) (\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1) 12)x";
        let (_, parsed) = body(wire).unwrap();

        match parsed {
            BodyStructure::Message {
                fields,
                envelope,
                body,
                n_lines,
                ..
            } => {
                assert_eq!(fields.mime_type(), "message/rfc822");
                assert_eq!(envelope.subject.as_deref(), Some("inner"));
                assert_eq!(body.mime_type(), "text/plain");
                assert_eq!(n_lines, 12);
            }
            other => panic!("not message: {other:?}"),
        }
    }

    #[test]
    fn test_nil_encoding_quirk() {
        let wire = b"(\"TEXT\" \"PLAIN\" NIL NIL NIL NIL 10 1)x";
        let (_, parsed) = body(wire).unwrap();
        match parsed {
            BodyStructure::Text { fields, .. } => assert_eq!(fields.transfer_encoding, ""),
            other => panic!("not text: {other:?}"),
        }
    }

    #[test]
    fn test_runaway_nesting() {
        let mut wire = Vec::new();
        for _ in 0..64 {
            wire.extend_from_slice(b"(");
        }
        wire.extend_from_slice(b"\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 1 1");
        assert!(body(&wire).is_err());
    }
}
