//! Parsers for IMAP extensions that ship their own untagged responses.

pub mod condstore_qresync;
pub mod enable;
pub mod esearch;
pub mod genurlauth;
pub mod id;
pub mod namespace;
pub mod sort_thread;

/// True when the cursor sits on the line-terminating CRLF (or past it).
pub(crate) fn at_line_end(input: &[u8]) -> bool {
    matches!(input.first(), None | Some(b'\r') | Some(b'\n'))
}
