//! The externally visible query keys and their answer type.

use chrono::{DateTime, FixedOffset};
use mainsail_proto::envelope::{Address, Envelope};

/// Everything a view can ask a node for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    // generic
    IsFetched,
    IsUnavailable,
    // mailbox
    MailboxName,
    ShortMailboxName,
    MailboxSeparator,
    TotalMessageCount,
    UnreadMessageCount,
    RecentMessageCount,
    MailboxIsINBOX,
    MailboxIsSelectable,
    MailboxHasChildMailboxes,
    MailboxNumbersFetched,
    MailboxUidValidity,
    MailboxIsSubscribed,
    // message
    MessageUid,
    MessageSubject,
    MessageFrom,
    MessageSender,
    MessageReplyTo,
    MessageTo,
    MessageCc,
    MessageBcc,
    MessageMessageId,
    MessageInReplyTo,
    MessageDate,
    MessageInternalDate,
    MessageSize,
    MessageIsMarkedRead,
    MessageIsMarkedDeleted,
    MessageIsMarkedForwarded,
    MessageIsMarkedReplied,
    MessageIsMarkedRecent,
    MessageIsMarkedFlagged,
    MessageIsMarkedJunk,
    MessageIsMarkedNotJunk,
    MessageWasUnread,
    MessageFuzzyDate,
    MessageHeaderReferences,
    MessageHeaderListPost,
    MessageHeaderListPostNo,
    MessageEnvelope,
    // part
    PartData,
    PartMimeType,
    PartCharset,
    PartContentFormat,
    PartContentDelSp,
    PartEncoding,
    PartBodyFldId,
    PartBodyDisposition,
    PartFileName,
    PartOctets,
    PartId,
    PartPathToPart,
    PartMultipartRelatedMainCid,
    PartIsTopLevelMultipart,
    PartBodyFldParam,
    PartBufferPtr,
    PartForceFetchFromCache,
}

/// A role's answer. `None` means "not applicable or not known yet".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    U32(u32),
    U64(u64),
    Str(String),
    Bytes(Vec<u8>),
    StrList(Vec<String>),
    StrPairs(Vec<(String, String)>),
    Addresses(Vec<Address>),
    Envelope(Envelope),
    DateTime(DateTime<FixedOffset>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::U32(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map_or(Value::None, Value::Str)
    }
}
