//! Client commands and their wire serialization.
//!
//! A [`Command`] is a tag plus a [`CommandBody`]; [`Command::serialize`]
//! produces the exact bytes for the wire, `<tag> <verb> <args>\r\n`, with
//! literals emitted as `{n}\r\n<n bytes>`.
//!
//! Synchronizing literals split a command into chunks: everything up to and
//! including the `{n}\r\n` announcement goes out first, the rest only after
//! the server's continuation request. [`WireCommand::continuations`] lists
//! those split points so the connection layer can pace itself; with
//! `LITERAL+` the command is a single chunk.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, FixedOffset};

use crate::sequence::SequenceSet;

/// Serialized command bytes plus the offsets at which the sender must wait
/// for a command continuation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireCommand {
    pub bytes: Vec<u8>,
    /// Offsets *after* a literal announcement's CRLF; empty when the
    /// command can be sent in one piece.
    pub continuations: Vec<usize>,
}

impl WireCommand {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            continuations: Vec::new(),
        }
    }
}

/// `STATUS` data items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusItem {
    Messages,
    Recent,
    UidNext,
    UidValidity,
    Unseen,
    HighestModSeq,
}

impl StatusItem {
    fn name(self) -> &'static str {
        match self {
            StatusItem::Messages => "MESSAGES",
            StatusItem::Recent => "RECENT",
            StatusItem::UidNext => "UIDNEXT",
            StatusItem::UidValidity => "UIDVALIDITY",
            StatusItem::Unseen => "UNSEEN",
            StatusItem::HighestModSeq => "HIGHESTMODSEQ",
        }
    }
}

/// FETCH data item names the client asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttr {
    Uid,
    Flags,
    Envelope,
    InternalDate,
    Rfc822Size,
    BodyStructure,
    /// `BODY.PEEK[section]`
    BodyPeek(String),
    /// `BINARY.PEEK[section]`
    BinaryPeek(String),
    /// `BODY.PEEK[HEADER.FIELDS (...)]`
    HeaderFields(Vec<String>),
}

impl FetchAttr {
    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            FetchAttr::Uid => out.extend_from_slice(b"UID"),
            FetchAttr::Flags => out.extend_from_slice(b"FLAGS"),
            FetchAttr::Envelope => out.extend_from_slice(b"ENVELOPE"),
            FetchAttr::InternalDate => out.extend_from_slice(b"INTERNALDATE"),
            FetchAttr::Rfc822Size => out.extend_from_slice(b"RFC822.SIZE"),
            FetchAttr::BodyStructure => out.extend_from_slice(b"BODYSTRUCTURE"),
            FetchAttr::BodyPeek(section) => {
                out.extend_from_slice(b"BODY.PEEK[");
                out.extend_from_slice(section.as_bytes());
                out.push(b']');
            }
            FetchAttr::BinaryPeek(section) => {
                out.extend_from_slice(b"BINARY.PEEK[");
                out.extend_from_slice(section.as_bytes());
                out.push(b']');
            }
            FetchAttr::HeaderFields(fields) => {
                out.extend_from_slice(b"BODY.PEEK[HEADER.FIELDS (");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    out.extend_from_slice(field.as_bytes());
                }
                out.extend_from_slice(b")]");
            }
        }
    }
}

/// `STORE` flag operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Replace,
    Add,
    Remove,
}

/// QRESYNC parameters for `SELECT`/`EXAMINE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QresyncParams {
    pub uid_validity: u32,
    pub highest_mod_seq: u64,
    pub known_uids: Option<SequenceSet>,
}

/// Everything the client core ever says to a server.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandBody {
    Capability,
    Noop,
    Logout,
    Login {
        user: String,
        password: String,
    },
    Authenticate {
        mechanism: String,
        /// SASL-IR initial response, sent base64-encoded on the command
        /// line itself.
        initial_response: Option<Vec<u8>>,
    },
    List {
        reference: String,
        pattern: String,
    },
    Lsub {
        reference: String,
        pattern: String,
    },
    Select {
        mailbox: String,
        qresync: Option<QresyncParams>,
    },
    Examine {
        mailbox: String,
    },
    Status {
        mailbox: String,
        items: Vec<StatusItem>,
    },
    Fetch {
        uid: bool,
        sequence: SequenceSet,
        items: Vec<FetchAttr>,
    },
    Search {
        uid: bool,
        /// Raw search program, e.g. `ALL` or `UID 15:*`.
        criteria: String,
        /// Emit the ESEARCH `RETURN (ALL)` form.
        return_all: bool,
    },
    Store {
        uid: bool,
        sequence: SequenceSet,
        action: StoreAction,
        silent: bool,
        flags: Vec<String>,
        unchanged_since: Option<u64>,
    },
    Expunge,
    UidExpunge(SequenceSet),
    Close,
    Unselect,
    Subscribe {
        mailbox: String,
    },
    Unsubscribe {
        mailbox: String,
    },
    Copy {
        uid: bool,
        sequence: SequenceSet,
        mailbox: String,
    },
    Append {
        mailbox: String,
        flags: Vec<String>,
        internal_date: Option<DateTime<FixedOffset>>,
        message: Vec<u8>,
    },
    Idle,
    Enable(Vec<String>),
    Id(Option<Vec<(String, String)>>),
    Namespace,
    Sort {
        uid: bool,
        criteria: Vec<String>,
        charset: String,
        search: String,
    },
    Thread {
        uid: bool,
        algorithm: String,
        charset: String,
        search: String,
    },
    GenUrlAuth {
        url: String,
        mechanism: String,
    },
    CompressDeflate,
}

/// A tagged command.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub tag: String,
    pub body: CommandBody,
}

impl Command {
    pub fn new(tag: impl Into<String>, body: CommandBody) -> Self {
        Self {
            tag: tag.into(),
            body,
        }
    }

    /// Serialize to wire bytes. `literal_plus` switches literals to the
    /// non-synchronizing `{n+}` form.
    pub fn serialize(&self, literal_plus: bool) -> WireCommand {
        let mut wire = WireCommand::new();
        let out = &mut wire.bytes;

        out.extend_from_slice(self.tag.as_bytes());
        out.push(b' ');

        match &self.body {
            CommandBody::Capability => out.extend_from_slice(b"CAPABILITY"),
            CommandBody::Noop => out.extend_from_slice(b"NOOP"),
            CommandBody::Logout => out.extend_from_slice(b"LOGOUT"),
            CommandBody::Login { user, password } => {
                out.extend_from_slice(b"LOGIN ");
                write_astring(&mut wire, user.as_bytes(), literal_plus);
                wire.bytes.push(b' ');
                write_astring(&mut wire, password.as_bytes(), literal_plus);
            }
            CommandBody::Authenticate {
                mechanism,
                initial_response,
            } => {
                wire.bytes.extend_from_slice(b"AUTHENTICATE ");
                wire.bytes.extend_from_slice(mechanism.as_bytes());
                if let Some(ir) = initial_response {
                    wire.bytes.push(b' ');
                    if ir.is_empty() {
                        wire.bytes.push(b'=');
                    } else {
                        wire.bytes
                            .extend_from_slice(BASE64.encode(ir).as_bytes());
                    }
                }
            }
            CommandBody::List { reference, pattern } => {
                wire.bytes.extend_from_slice(b"LIST ");
                write_mailbox(&mut wire, reference, literal_plus);
                wire.bytes.push(b' ');
                write_list_pattern(&mut wire, pattern, literal_plus);
            }
            CommandBody::Lsub { reference, pattern } => {
                wire.bytes.extend_from_slice(b"LSUB ");
                write_mailbox(&mut wire, reference, literal_plus);
                wire.bytes.push(b' ');
                write_list_pattern(&mut wire, pattern, literal_plus);
            }
            CommandBody::Select { mailbox, qresync } => {
                wire.bytes.extend_from_slice(b"SELECT ");
                write_mailbox(&mut wire, mailbox, literal_plus);
                if let Some(params) = qresync {
                    let out = &mut wire.bytes;
                    out.extend_from_slice(b" (QRESYNC (");
                    out.extend_from_slice(params.uid_validity.to_string().as_bytes());
                    out.push(b' ');
                    out.extend_from_slice(params.highest_mod_seq.to_string().as_bytes());
                    if let Some(known) = &params.known_uids {
                        out.push(b' ');
                        out.extend_from_slice(known.to_string().as_bytes());
                    }
                    out.extend_from_slice(b"))");
                }
            }
            CommandBody::Examine { mailbox } => {
                wire.bytes.extend_from_slice(b"EXAMINE ");
                write_mailbox(&mut wire, mailbox, literal_plus);
            }
            CommandBody::Status { mailbox, items } => {
                wire.bytes.extend_from_slice(b"STATUS ");
                write_mailbox(&mut wire, mailbox, literal_plus);
                let out = &mut wire.bytes;
                out.extend_from_slice(b" (");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    out.extend_from_slice(item.name().as_bytes());
                }
                out.push(b')');
            }
            CommandBody::Fetch {
                uid,
                sequence,
                items,
            } => {
                if *uid {
                    out.extend_from_slice(b"UID ");
                }
                out.extend_from_slice(b"FETCH ");
                out.extend_from_slice(sequence.to_string().as_bytes());
                out.extend_from_slice(b" (");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    item.write_to(out);
                }
                out.push(b')');
            }
            CommandBody::Search {
                uid,
                criteria,
                return_all,
            } => {
                if *uid {
                    out.extend_from_slice(b"UID ");
                }
                out.extend_from_slice(b"SEARCH ");
                if *return_all {
                    out.extend_from_slice(b"RETURN (ALL) ");
                }
                out.extend_from_slice(criteria.as_bytes());
            }
            CommandBody::Store {
                uid,
                sequence,
                action,
                silent,
                flags,
                unchanged_since,
            } => {
                if *uid {
                    out.extend_from_slice(b"UID ");
                }
                out.extend_from_slice(b"STORE ");
                out.extend_from_slice(sequence.to_string().as_bytes());
                out.push(b' ');
                if let Some(modseq) = unchanged_since {
                    out.extend_from_slice(
                        format!("(UNCHANGEDSINCE {modseq}) ").as_bytes(),
                    );
                }
                match action {
                    StoreAction::Replace => {}
                    StoreAction::Add => out.push(b'+'),
                    StoreAction::Remove => out.push(b'-'),
                }
                out.extend_from_slice(b"FLAGS");
                if *silent {
                    out.extend_from_slice(b".SILENT");
                }
                out.extend_from_slice(b" (");
                for (i, flag) in flags.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    out.extend_from_slice(flag.as_bytes());
                }
                out.push(b')');
            }
            CommandBody::Expunge => out.extend_from_slice(b"EXPUNGE"),
            CommandBody::UidExpunge(sequence) => {
                out.extend_from_slice(b"UID EXPUNGE ");
                out.extend_from_slice(sequence.to_string().as_bytes());
            }
            CommandBody::Close => out.extend_from_slice(b"CLOSE"),
            CommandBody::Unselect => out.extend_from_slice(b"UNSELECT"),
            CommandBody::Subscribe { mailbox } => {
                wire.bytes.extend_from_slice(b"SUBSCRIBE ");
                write_mailbox(&mut wire, mailbox, literal_plus);
            }
            CommandBody::Unsubscribe { mailbox } => {
                wire.bytes.extend_from_slice(b"UNSUBSCRIBE ");
                write_mailbox(&mut wire, mailbox, literal_plus);
            }
            CommandBody::Copy {
                uid,
                sequence,
                mailbox,
            } => {
                if *uid {
                    out.extend_from_slice(b"UID ");
                }
                out.extend_from_slice(b"COPY ");
                out.extend_from_slice(sequence.to_string().as_bytes());
                out.push(b' ');
                write_mailbox(&mut wire, mailbox, literal_plus);
            }
            CommandBody::Append {
                mailbox,
                flags,
                internal_date,
                message,
            } => {
                wire.bytes.extend_from_slice(b"APPEND ");
                write_mailbox(&mut wire, mailbox, literal_plus);
                let out = &mut wire.bytes;
                if !flags.is_empty() {
                    out.extend_from_slice(b" (");
                    for (i, flag) in flags.iter().enumerate() {
                        if i > 0 {
                            out.push(b' ');
                        }
                        out.extend_from_slice(flag.as_bytes());
                    }
                    out.push(b')');
                }
                if let Some(date) = internal_date {
                    out.extend_from_slice(
                        format!(" \"{}\"", date.format("%d-%b-%Y %H:%M:%S %z")).as_bytes(),
                    );
                }
                wire.bytes.push(b' ');
                write_literal(&mut wire, message, literal_plus);
            }
            CommandBody::Idle => out.extend_from_slice(b"IDLE"),
            CommandBody::Enable(extensions) => {
                out.extend_from_slice(b"ENABLE");
                for extension in extensions {
                    out.push(b' ');
                    out.extend_from_slice(extension.as_bytes());
                }
            }
            CommandBody::Id(fields) => {
                out.extend_from_slice(b"ID ");
                match fields {
                    None => out.extend_from_slice(b"NIL"),
                    Some(pairs) => {
                        out.push(b'(');
                        for (i, (key, value)) in pairs.iter().enumerate() {
                            if i > 0 {
                                out.push(b' ');
                            }
                            write_quoted(out, key.as_bytes());
                            out.push(b' ');
                            write_quoted(out, value.as_bytes());
                        }
                        out.push(b')');
                    }
                }
            }
            CommandBody::Namespace => out.extend_from_slice(b"NAMESPACE"),
            CommandBody::Sort {
                uid,
                criteria,
                charset,
                search,
            } => {
                if *uid {
                    out.extend_from_slice(b"UID ");
                }
                out.extend_from_slice(b"SORT (");
                for (i, criterion) in criteria.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    out.extend_from_slice(criterion.as_bytes());
                }
                out.extend_from_slice(b") ");
                out.extend_from_slice(charset.as_bytes());
                out.push(b' ');
                out.extend_from_slice(search.as_bytes());
            }
            CommandBody::Thread {
                uid,
                algorithm,
                charset,
                search,
            } => {
                if *uid {
                    out.extend_from_slice(b"UID ");
                }
                out.extend_from_slice(b"THREAD ");
                out.extend_from_slice(algorithm.as_bytes());
                out.push(b' ');
                out.extend_from_slice(charset.as_bytes());
                out.push(b' ');
                out.extend_from_slice(search.as_bytes());
            }
            CommandBody::GenUrlAuth { url, mechanism } => {
                let out = &mut wire.bytes;
                out.extend_from_slice(b"GENURLAUTH ");
                write_quoted(out, url.as_bytes());
                out.push(b' ');
                out.extend_from_slice(mechanism.as_bytes());
            }
            CommandBody::CompressDeflate => out.extend_from_slice(b"COMPRESS DEFLATE"),
        }

        wire.bytes.extend_from_slice(b"\r\n");
        wire
    }
}

/// The `DONE` that terminates IDLE; not a tagged command.
pub fn idle_done() -> Vec<u8> {
    b"DONE\r\n".to_vec()
}

fn is_command_atom_char(byte: u8) -> bool {
    // the conservative command-side set: no brackets either
    byte > 0x1f
        && byte < 0x7f
        && !matches!(
            byte,
            b'(' | b')' | b'{' | b' ' | b'%' | b'*' | b'"' | b'\\' | b']' | b'['
        )
}

fn write_quoted(out: &mut Vec<u8>, value: &[u8]) {
    out.push(b'"');
    for &byte in value {
        if byte == b'"' || byte == b'\\' {
            out.push(b'\\');
        }
        out.push(byte);
    }
    out.push(b'"');
}

fn write_literal(wire: &mut WireCommand, value: &[u8], literal_plus: bool) {
    wire.bytes
        .extend_from_slice(format!("{{{}", value.len()).as_bytes());
    if literal_plus {
        wire.bytes.push(b'+');
    }
    wire.bytes.extend_from_slice(b"}\r\n");
    if !literal_plus {
        wire.continuations.push(wire.bytes.len());
    }
    wire.bytes.extend_from_slice(value);
}

/// Emit an `astring`: bare atom when possible, quoted when printable,
/// literal otherwise.
fn write_astring(wire: &mut WireCommand, value: &[u8], literal_plus: bool) {
    if !value.is_empty() && value.iter().all(|&b| is_command_atom_char(b)) {
        wire.bytes.extend_from_slice(value);
    } else if value
        .iter()
        .all(|&b| b != b'\r' && b != b'\n' && b != 0 && b < 0x80)
    {
        write_quoted(&mut wire.bytes, value);
    } else {
        write_literal(wire, value, literal_plus);
    }
}

/// Encode a mailbox name: modified UTF-7, then astring rules.
fn write_mailbox(wire: &mut WireCommand, name: &str, literal_plus: bool) {
    let encoded = utf7_imap::encode_utf7_imap(name.to_owned());
    write_astring(wire, encoded.as_bytes(), literal_plus);
}

/// LIST patterns may contain `*` and `%`, which the astring writer would
/// needlessly quote away from atom form; they are legal in patterns.
fn write_list_pattern(wire: &mut WireCommand, pattern: &str, literal_plus: bool) {
    let encoded = utf7_imap::encode_utf7_imap(pattern.to_owned());
    let bytes = encoded.as_bytes();
    if !bytes.is_empty()
        && bytes
            .iter()
            .all(|&b| is_command_atom_char(b) || b == b'*' || b == b'%')
    {
        wire.bytes.extend_from_slice(bytes);
    } else {
        write_astring(wire, bytes, literal_plus);
    }
}
