//! The client-side error taxonomy.

use mainsail_proto::response::{ParseErrorResponse, StateKind};
use thiserror::Error;

/// Everything that can go wrong above the parser.
///
/// Errors are task-local: they fail the task that hit them and surface to
/// the embedder as an error event tied to the node the task was working
/// for. Only [`Error::Disconnected`] and protocol desynchronization tear
/// the connection down.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Malformed bytes from the server, with position attached.
    #[error("malformed server data: {0}")]
    Parse(#[from] ParseErrorResponse),

    /// A FETCH referenced a sequence number outside the current message
    /// list, or a section referenced a part that does not exist.
    #[error("unknown message index {index} in mailbox {mailbox}")]
    UnknownMessageIndex { mailbox: String, index: u32 },

    /// A response arrived that the current state machine cannot accept.
    #[error("unexpected response received: {0}")]
    UnexpectedResponse(String),

    /// Mailbox-level consistency violation (UIDs broken, EXISTS shrank on
    /// an untagged EXISTS, ...). Loud by policy.
    #[error("mailbox state broken in {mailbox}: {message}")]
    Mailbox { mailbox: String, message: String },

    /// The transport is gone. Terminal for every task.
    #[error("socket disconnected: {0}")]
    Disconnected(String),

    /// Tagged NO/BAD or BYE addressed at a task.
    #[error("server replied {kind:?}: {text}")]
    Server { kind: StateKind, text: String },

    /// The task was cancelled before it could finish.
    #[error("aborted: {0}")]
    Aborted(String),
}

impl Error {
    /// Does this error mean the connection itself is beyond saving?
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Error::Disconnected(_))
    }
}
