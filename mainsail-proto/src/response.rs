//! Typed server responses and the one-line response parser.
//!
//! [`parse_response`] takes one complete response line (CRLF included,
//! literals inlined) and produces a [`Response`]. A line that cannot be
//! parsed is turned into a [`ParseErrorResponse`] by the caller and pushed
//! through the same pipeline as everything else, so the task layer gets to
//! decide between failing one task and dropping the connection.
//!
//! The `Debug` rendition of a [`Response`] is the documented debug form:
//! it is deterministic for equal values and stable across runs.

use nom::{
    bytes::streaming::{tag, tag_no_case, take_while},
    combinator::opt,
    sequence::{delimited, preceded, terminated},
};

use crate::{
    core::{any, atom, eat_spaces, mailbox, number, number64, Any},
    decode::{ParseErrorKind, ProtoParseError, ProtoResult},
    extensions::{
        at_line_end,
        condstore_qresync::{vanished, Vanished},
        enable::enabled,
        esearch::{esearch, ESearch},
        genurlauth::genurlauth,
        id::id_response,
        namespace::{namespace, NamespaceResponse},
        sort_thread::{sort_numbers, thread_response, ThreadNode},
    },
    fetch::{msg_att, FetchResponse},
    flag::flag_list,
    sequence::{sequence_set, SequenceSet},
};

/// OK / NO / BAD / BYE / PREAUTH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Ok,
    No,
    Bad,
    Bye,
    PreAuth,
}

/// A status ("state") response, tagged or untagged, possibly carrying a
/// response code.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    /// `None` for untagged responses.
    pub tag: Option<String>,
    pub kind: StateKind,
    pub code: Option<RespCode>,
    pub text: String,
}

/// The `[...]` response code inside a state response.
///
/// Unknown codes are preserved verbatim under [`RespCode::Atom`].
#[derive(Debug, Clone, PartialEq)]
pub enum RespCode {
    Alert,
    BadCharset(Vec<String>),
    /// Spelled `CAPABILITY` on the wire.
    Capabilities(Vec<String>),
    Parse,
    PermanentFlags(Vec<String>),
    ReadOnly,
    ReadWrite,
    TryCreate,
    UidNext(u32),
    UidValidity(u32),
    Unseen(u32),
    NewName(String),
    Referral(String),
    UnknownCte,
    UidNotSticky,
    AppendUid {
        uid_validity: u32,
        uids: SequenceSet,
    },
    CopyUid {
        uid_validity: u32,
        source: SequenceSet,
        destination: SequenceSet,
    },
    TooBig,
    BadUrl(String),
    HighestModSeq(u64),
    NoModSeq,
    CompressionActive,
    Closed,
    NotSaved,
    BadComparator,
    Annotate(String),
    TempFail,
    MaxConvertMessages(u32),
    MaxConvertParts(u32),
    NoUpdate(String),
    NotificationOverflow,
    BadEvent(Vec<String>),
    UndefinedFilter(String),
    Unavailable,
    AuthenticationFailed,
    AuthorizationFailed,
    Expired,
    PrivacyRequired,
    ContactAdmin,
    NoPerm,
    InUse,
    ExpungeIssued,
    Corruption,
    ServerBug,
    ClientBug,
    Cannot,
    Limit,
    OverQuota,
    AlreadyExists,
    Nonexistent,
    PolicyDenied,
    SubmissionRace,
    /// Catch-all: anything not recognized above, kept verbatim.
    Atom { name: String, rest: String },
}

/// `* LIST` / `* LSUB`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListResponse {
    pub lsub: bool,
    pub flags: Vec<String>,
    pub separator: Option<char>,
    pub mailbox: String,
    /// LIST-EXTENDED key/value pairs.
    pub extended: Vec<(String, Any)>,
}

/// `* STATUS mailbox (...)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusResponse {
    pub mailbox: String,
    pub messages: Option<u32>,
    pub recent: Option<u32>,
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
    pub unseen: Option<u32>,
    pub highest_mod_seq: Option<u64>,
}

/// A line the parser could not make sense of, delivered through the normal
/// response pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset} in {lossy:?}", lossy = String::from_utf8_lossy(.line))]
pub struct ParseErrorResponse {
    pub message: String,
    pub line: Vec<u8>,
    /// Byte offset into `line` where parsing stalled.
    pub offset: usize,
}

/// Transport lifecycle, reported as synthetic responses so that tasks see
/// one uniform event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Connected,
    TlsEstablished,
    Disconnected { reason: String },
}

/// Any response the server (or the transport layer) can hand us.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    State(State),
    Capability(Vec<String>),
    Exists(u32),
    Recent(u32),
    Expunge(u32),
    List(ListResponse),
    Flags(Vec<String>),
    Search(Vec<u32>),
    ESearch(ESearch),
    Status(StatusResponse),
    Fetch(FetchResponse),
    Namespace(NamespaceResponse),
    Sort(Vec<u32>),
    Thread(Vec<ThreadNode>),
    Id(Option<Vec<(String, String)>>),
    Enabled(Vec<String>),
    Vanished(Vanished),
    GenUrlAuth(String),
    /// `+ ...`: the server is ready for the rest of a command.
    ContinueRequest(String),
    /// Synthetic: a line that did not parse.
    ParseFailure(ParseErrorResponse),
    /// Synthetic: transport lifecycle.
    Socket(SocketEvent),
}

impl Response {
    /// The tag this response completes, if it is a tagged state response.
    pub fn completion_tag(&self) -> Option<&str> {
        match self {
            Response::State(state) => state.tag.as_deref(),
            _ => None,
        }
    }
}

impl From<ParseErrorResponse> for Response {
    fn from(error: ParseErrorResponse) -> Self {
        Response::ParseFailure(error)
    }
}

/// Parse one complete response line.
pub fn parse_response(line: &[u8]) -> Result<Response, ParseErrorResponse> {
    match response(line) {
        Ok((remaining, parsed)) => {
            if remaining.is_empty() || remaining == b"\r\n" || remaining == b"\n" {
                Ok(parsed)
            } else {
                Err(ParseErrorResponse {
                    message: String::from("trailing garbage after response"),
                    line: line.to_vec(),
                    offset: line.len() - remaining.len(),
                })
            }
        }
        Err(err) => {
            let (offset, message) = match err {
                nom::Err::Incomplete(_) => {
                    (line.len(), String::from("response truncated"))
                }
                nom::Err::Error(e) | nom::Err::Failure(e) => (
                    line.len().saturating_sub(e.input.len()),
                    format!("cannot parse response: {:?}", e.kind),
                ),
            };
            Err(ParseErrorResponse {
                message,
                line: line.to_vec(),
                offset,
            })
        }
    }
}

fn response(input: &[u8]) -> ProtoResult<'_, Response> {
    if let Some(rest) = input.strip_prefix(b"+") {
        let rest = rest.strip_prefix(b" ").unwrap_or(rest);
        return Ok((b"", Response::ContinueRequest(text_of(rest))));
    }

    if let Ok((rest, _)) = tag::<_, _, ProtoParseError<'_>>(b"* ")(input) {
        return untagged(rest);
    }

    // tagged response
    let (rest, tag_value) = atom(input)?;
    let (rest, _) = tag(b" ")(rest)?;
    let (rest, kind) = state_kind(rest)?;

    match kind {
        StateKind::Ok | StateKind::No | StateKind::Bad => {}
        // tagged response of weird kind
        _ => {
            return Err(ProtoParseError::failure(
                input,
                ParseErrorKind::UnexpectedHere,
            ))
        }
    }

    let (rest, (code, text)) = resp_text(rest)?;

    Ok((
        rest,
        Response::State(State {
            tag: Some(tag_value.to_owned()),
            kind,
            code,
            text,
        }),
    ))
}

fn untagged(input: &[u8]) -> ProtoResult<'_, Response> {
    if input.first().is_some_and(|b| b.is_ascii_digit()) {
        return untagged_numbered(input);
    }

    let (rest, identifier) = atom(input)?;
    let identifier = identifier.to_ascii_uppercase();

    match identifier.as_str() {
        "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
            let kind = match identifier.as_str() {
                "OK" => StateKind::Ok,
                "NO" => StateKind::No,
                "BAD" => StateKind::Bad,
                "PREAUTH" => StateKind::PreAuth,
                _ => StateKind::Bye,
            };
            let (rest, _) = eat_spaces(rest)?;
            let (rest, (code, text)) = resp_text(rest)?;
            Ok((
                rest,
                Response::State(State {
                    tag: None,
                    kind,
                    code,
                    text,
                }),
            ))
        }
        "CAPABILITY" => {
            let (rest, caps) = atoms_until_line_end(rest)?;
            Ok((rest, Response::Capability(caps)))
        }
        "LIST" => list_response(rest, false),
        "LSUB" => list_response(rest, true),
        "FLAGS" => {
            let (rest, flags) = preceded(eat_spaces, flag_list)(rest)?;
            Ok((rest, Response::Flags(flags)))
        }
        "SEARCH" => {
            let (rest, numbers) = sort_numbers(rest)?;
            Ok((rest, Response::Search(numbers)))
        }
        "ESEARCH" => {
            let (rest, parsed) = esearch(rest)?;
            Ok((rest, Response::ESearch(parsed)))
        }
        "STATUS" => {
            let (rest, parsed) = preceded(eat_spaces, status_response)(rest)?;
            Ok((rest, Response::Status(parsed)))
        }
        "NAMESPACE" => {
            let (rest, parsed) = preceded(eat_spaces, namespace)(rest)?;
            Ok((rest, Response::Namespace(parsed)))
        }
        "SORT" => {
            let (rest, numbers) = sort_numbers(rest)?;
            Ok((rest, Response::Sort(numbers)))
        }
        "THREAD" => {
            let (rest, threads) = thread_response(rest)?;
            Ok((rest, Response::Thread(threads)))
        }
        "ID" => {
            let (rest, parsed) = preceded(eat_spaces, id_response)(rest)?;
            Ok((rest, Response::Id(parsed)))
        }
        "ENABLED" => {
            let (rest, extensions) = enabled(rest)?;
            Ok((rest, Response::Enabled(extensions)))
        }
        "VANISHED" => {
            let (rest, parsed) = preceded(eat_spaces, vanished)(rest)?;
            Ok((rest, Response::Vanished(parsed)))
        }
        "GENURLAUTH" => {
            let (rest, url) = preceded(eat_spaces, genurlauth)(rest)?;
            Ok((rest, Response::GenUrlAuth(url)))
        }
        _ => Err(ProtoParseError::failure(
            input,
            ParseErrorKind::UnexpectedHere,
        )),
    }
}

/// `nz-number SP ("EXISTS" / "RECENT" / "EXPUNGE" / "FETCH" SP msg-att)`
fn untagged_numbered(input: &[u8]) -> ProtoResult<'_, Response> {
    let (rest, n) = terminated(number, tag(b" "))(input)?;
    let (rest, identifier) = atom(rest)?;

    match identifier.to_ascii_uppercase().as_str() {
        "EXISTS" => Ok((rest, Response::Exists(n))),
        "RECENT" => Ok((rest, Response::Recent(n))),
        "EXPUNGE" => {
            if n == 0 {
                return Err(ProtoParseError::failure(input, ParseErrorKind::BadNumber));
            }
            Ok((rest, Response::Expunge(n)))
        }
        "FETCH" => {
            if n == 0 {
                return Err(ProtoParseError::failure(input, ParseErrorKind::BadNumber));
            }
            let (rest, items) = preceded(eat_spaces, msg_att)(rest)?;
            Ok((rest, Response::Fetch(FetchResponse { seq: n, items })))
        }
        _ => Err(ProtoParseError::failure(
            input,
            ParseErrorKind::UnexpectedHere,
        )),
    }
}

fn state_kind(input: &[u8]) -> ProtoResult<'_, StateKind> {
    let (rest, identifier) = terminated(atom, eat_spaces)(input)?;

    let kind = match identifier.to_ascii_uppercase().as_str() {
        "OK" => StateKind::Ok,
        "NO" => StateKind::No,
        "BAD" => StateKind::Bad,
        "BYE" => StateKind::Bye,
        "PREAUTH" => StateKind::PreAuth,
        _ => {
            return Err(ProtoParseError::failure(
                input,
                ParseErrorKind::UnexpectedHere,
            ))
        }
    };

    Ok((rest, kind))
}

/// `resp-text = ["[" resp-text-code "]" SP] text`
fn resp_text(input: &[u8]) -> ProtoResult<'_, (Option<RespCode>, String)> {
    if input.first() == Some(&b'[') {
        let (rest, code) = resp_text_code(input)?;
        let (rest, _) = eat_spaces(rest)?;
        let text = text_of(rest);
        if text.is_empty() {
            log::debug!("response with no text besides the response code");
        }
        Ok((b"", (Some(code), text)))
    } else {
        Ok((b"", (None, text_of(input))))
    }
}

/// Everything up to the final CRLF, lossily decoded.
fn text_of(input: &[u8]) -> String {
    let end = input
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(input.len());
    String::from_utf8_lossy(&input[..end]).into_owned()
}

/// The raw bytes up to the closing `]` of a response code.
fn until_bracket_close(input: &[u8]) -> ProtoResult<'_, &[u8]> {
    terminated(
        take_while(|b| b != b']' && b != b'\r' && b != b'\n'),
        tag(b"]"),
    )(input)
}

/// `"[" resp-text-code "]"`
///
/// Dispatches on the first atom inside the brackets, then parses the
/// code-specific payload; anything unrecognized is preserved verbatim.
fn resp_text_code(input: &[u8]) -> ProtoResult<'_, RespCode> {
    let (rest, _) = tag(b"[")(input)?;
    let (rest, name) = atom(rest)?;
    let name = name.to_ascii_uppercase();

    // the trivial ones: no payload before "]"
    let unit = match name.as_str() {
        "ALERT" => Some(RespCode::Alert),
        "PARSE" => Some(RespCode::Parse),
        "READ-ONLY" => Some(RespCode::ReadOnly),
        "READ-WRITE" => Some(RespCode::ReadWrite),
        "TRYCREATE" => Some(RespCode::TryCreate),
        "UNKNOWN-CTE" => Some(RespCode::UnknownCte),
        "UIDNOTSTICKY" => Some(RespCode::UidNotSticky),
        "TOOBIG" => Some(RespCode::TooBig),
        "NOMODSEQ" => Some(RespCode::NoModSeq),
        "COMPRESSIONACTIVE" => Some(RespCode::CompressionActive),
        "CLOSED" => Some(RespCode::Closed),
        "NOTSAVED" => Some(RespCode::NotSaved),
        "BADCOMPARATOR" => Some(RespCode::BadComparator),
        "TEMPFAIL" => Some(RespCode::TempFail),
        "NOTIFICATIONOVERFLOW" => Some(RespCode::NotificationOverflow),
        "UNAVAILABLE" => Some(RespCode::Unavailable),
        "AUTHENTICATIONFAILED" => Some(RespCode::AuthenticationFailed),
        "AUTHORIZATIONFAILED" => Some(RespCode::AuthorizationFailed),
        "EXPIRED" => Some(RespCode::Expired),
        "PRIVACYREQUIRED" => Some(RespCode::PrivacyRequired),
        "CONTACTADMIN" => Some(RespCode::ContactAdmin),
        "NOPERM" => Some(RespCode::NoPerm),
        "INUSE" => Some(RespCode::InUse),
        "EXPUNGEISSUED" => Some(RespCode::ExpungeIssued),
        "CORRUPTION" => Some(RespCode::Corruption),
        "SERVERBUG" => Some(RespCode::ServerBug),
        "CLIENTBUG" => Some(RespCode::ClientBug),
        "CANNOT" => Some(RespCode::Cannot),
        "LIMIT" => Some(RespCode::Limit),
        "OVERQUOTA" => Some(RespCode::OverQuota),
        "ALREADYEXISTS" => Some(RespCode::AlreadyExists),
        "NONEXISTENT" => Some(RespCode::Nonexistent),
        "POLICYDENIED" => Some(RespCode::PolicyDenied),
        "SUBMISSIONRACE" => Some(RespCode::SubmissionRace),
        _ => None,
    };
    if let Some(code) = unit {
        let (rest, _) = tag(b"]")(rest)?;
        return Ok((rest, code));
    }

    match name.as_str() {
        "UIDNEXT" | "UIDVALIDITY" | "UNSEEN" | "MAXCONVERTMESSAGES" | "MAXCONVERTPARTS" => {
            let (rest, n) = preceded(tag(b" "), number)(rest)?;
            let (rest, _) = tag(b"]")(rest)?;
            let code = match name.as_str() {
                "UIDNEXT" => RespCode::UidNext(n),
                "UIDVALIDITY" => RespCode::UidValidity(n),
                "UNSEEN" => RespCode::Unseen(n),
                "MAXCONVERTMESSAGES" => RespCode::MaxConvertMessages(n),
                _ => RespCode::MaxConvertParts(n),
            };
            Ok((rest, code))
        }
        "HIGHESTMODSEQ" => {
            let (rest, n) = preceded(tag(b" "), number64)(rest)?;
            let (rest, _) = tag(b"]")(rest)?;
            Ok((rest, RespCode::HighestModSeq(n)))
        }
        "PERMANENTFLAGS" => {
            let (rest, flags) = preceded(tag(b" "), flag_list)(rest)?;
            let (rest, _) = tag(b"]")(rest)?;
            if flags.is_empty() {
                log::debug!("parser warning: empty PERMANENTFLAGS");
            }
            Ok((rest, RespCode::PermanentFlags(flags)))
        }
        "BADCHARSET" => {
            let (rest, charsets) = opt(preceded(tag(b" "), any))(rest)?;
            let (rest, _) = tag(b"]")(rest)?;
            let allowed = match charsets {
                Some(Any::List(items)) => items.iter().map(Any::to_text).collect(),
                Some(other) => vec![other.to_text()],
                None => Vec::new(),
            };
            Ok((rest, RespCode::BadCharset(allowed)))
        }
        "BADEVENT" => {
            let (rest, events) = opt(preceded(tag(b" "), any))(rest)?;
            let (rest, _) = tag(b"]")(rest)?;
            let events = match events {
                Some(Any::List(items)) => items.iter().map(Any::to_text).collect(),
                Some(other) => vec![other.to_text()],
                None => {
                    log::debug!("parser warning: empty BADEVENT");
                    Vec::new()
                }
            };
            Ok((rest, RespCode::BadEvent(events)))
        }
        "CAPABILITY" => {
            let (rest, raw) = until_bracket_close(rest)?;
            let caps = raw
                .split(|&b| b == b' ')
                .filter(|chunk| !chunk.is_empty())
                .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                .collect();
            Ok((rest, RespCode::Capabilities(caps)))
        }
        "APPENDUID" => {
            let (rest, uid_validity) = preceded(tag(b" "), number)(rest)?;
            let (rest, uids) = preceded(tag(b" "), sequence_set)(rest)?;
            let (rest, _) = tag(b"]")(rest)?;
            Ok((rest, RespCode::AppendUid { uid_validity, uids }))
        }
        "COPYUID" => {
            let (rest, uid_validity) = preceded(tag(b" "), number)(rest)?;
            let (rest, source) = preceded(tag(b" "), sequence_set)(rest)?;
            let (rest, destination) = preceded(tag(b" "), sequence_set)(rest)?;
            let (rest, _) = tag(b"]")(rest)?;
            Ok((
                rest,
                RespCode::CopyUid {
                    uid_validity,
                    source,
                    destination,
                },
            ))
        }
        "ANNOTATE" => {
            let (rest, raw) = preceded(eat_spaces, until_bracket_close)(rest)?;
            let token = String::from_utf8_lossy(raw).trim().to_ascii_uppercase();
            if token == "TOOBIG" || token == "TOOMANY" {
                Ok((rest, RespCode::Annotate(token)))
            } else {
                Err(ProtoParseError::failure(
                    input,
                    ParseErrorKind::UnexpectedHere,
                ))
            }
        }
        "NEWNAME" | "REFERRAL" | "BADURL" | "NOUPDATE" | "UNDEFINED-FILTER" => {
            let (rest, raw) = preceded(eat_spaces, until_bracket_close)(rest)?;
            let value = String::from_utf8_lossy(raw).trim().to_string();
            let code = match name.as_str() {
                "NEWNAME" => RespCode::NewName(value),
                "REFERRAL" => RespCode::Referral(value),
                "BADURL" => RespCode::BadUrl(value),
                "NOUPDATE" => RespCode::NoUpdate(value.trim_matches('"').to_string()),
                _ => RespCode::UndefinedFilter(value),
            };
            Ok((rest, code))
        }
        _ => {
            let (rest, raw) = preceded(eat_spaces, until_bracket_close)(rest)?;
            Ok((
                rest,
                RespCode::Atom {
                    name,
                    rest: String::from_utf8_lossy(raw).trim().to_string(),
                },
            ))
        }
    }
}

fn atoms_until_line_end(input: &[u8]) -> ProtoResult<'_, Vec<String>> {
    let mut out = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = eat_spaces(remaining)?;
        remaining = rest;
        if at_line_end(remaining) {
            return Ok((remaining, out));
        }

        let (rest, name) = atom(remaining)?;
        out.push(name.to_owned());
        remaining = rest;
    }
}

/// `LIST (flags) sep mailbox [extended]` after the LIST/LSUB identifier.
fn list_response(input: &[u8], lsub: bool) -> ProtoResult<'_, Response> {
    let (rest, _) = eat_spaces(input)?;
    let (rest, raw_flags) = crate::core::plist(rest)?;
    let flags = raw_flags.iter().map(Any::to_text).collect();

    let (rest, _) = eat_spaces(rest)?;
    let (rest, separator) = list_separator(rest)?;

    let (rest, _) = eat_spaces(rest)?;
    let (rest, mailbox_name) = mailbox(rest)?;

    let (rest, _) = eat_spaces(rest)?;
    let (rest, extended) = if rest.first() == Some(&b'(') {
        let (rest, items) = crate::core::plist(rest)?;
        if items.len() % 2 != 0 {
            return Err(ProtoParseError::failure(
                input,
                ParseErrorKind::UnexpectedHere,
            ));
        }
        let pairs = items
            .chunks(2)
            .map(|pair| (pair[0].to_text(), pair[1].clone()))
            .collect();
        (rest, pairs)
    } else {
        (rest, Vec::new())
    };

    Ok((
        rest,
        Response::List(ListResponse {
            lsub,
            flags,
            separator,
            mailbox: mailbox_name,
            extended,
        }),
    ))
}

/// `DQUOTE QUOTED-CHAR DQUOTE / nil`
fn list_separator(input: &[u8]) -> ProtoResult<'_, Option<char>> {
    if input.first() == Some(&b'"') {
        let (rest, c) = delimited(
            tag(b"\""),
            preceded(opt(tag(b"\\")), nom::bytes::streaming::take(1usize)),
            tag(b"\""),
        )(input)?;
        Ok((rest, Some(c[0] as char)))
    } else {
        let (rest, _) = tag_no_case(b"NIL")(input)?;
        Ok((rest, None))
    }
}

/// `mailbox SP "(" [status-att SP number ...] ")"`
fn status_response(input: &[u8]) -> ProtoResult<'_, StatusResponse> {
    let (rest, mailbox_name) = mailbox(input)?;
    let (rest, _) = eat_spaces(rest)?;
    let (rest, items) = crate::core::plist(rest)?;

    #[cfg(feature = "quirk_trailing_space_status")]
    let rest = {
        let (rest, _) = eat_spaces(rest)?;
        rest
    };

    if items.len() % 2 != 0 {
        return Err(ProtoParseError::failure(
            input,
            ParseErrorKind::UnexpectedHere,
        ));
    }

    let mut parsed = StatusResponse {
        mailbox: mailbox_name,
        ..StatusResponse::default()
    };

    for pair in items.chunks(2) {
        let key = pair[0].to_text().to_ascii_uppercase();
        let Some(value) = pair[1].as_num() else {
            return Err(ProtoParseError::failure(
                input,
                ParseErrorKind::UnexpectedHere,
            ));
        };
        match key.as_str() {
            "MESSAGES" => parsed.messages = Some(value),
            "RECENT" => parsed.recent = Some(value),
            "UIDNEXT" => parsed.uid_next = Some(value),
            "UIDVALIDITY" => parsed.uid_validity = Some(value),
            "UNSEEN" => parsed.unseen = Some(value),
            "HIGHESTMODSEQ" => parsed.highest_mod_seq = Some(u64::from(value)),
            other => log::debug!("STATUS: ignoring unknown item {other}"),
        }
    }

    Ok((rest, parsed))
}
