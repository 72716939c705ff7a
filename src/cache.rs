//! The persistent cache interface and the default in-memory backend.
//!
//! The core treats the cache as opaque storage keyed by mailbox name; the
//! on-disk format is entirely the implementer's business. Two rules matter:
//!
//! * the `SyncState` and the sequence→UID map of a mailbox form one logical
//!   unit — the sync engine always writes both, back to back, and nothing
//!   else may write either;
//! * flag writes may lag behind, because flags are re-learned on every
//!   resync anyway.

use mainsail_proto::envelope::Envelope;

use crate::model::{metadata::MailboxMetadata, sync_state::SyncState};

mod memory;

pub use memory::MemoryCache;

/// All cached knowledge about one message, except part bodies.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageDataBundle {
    /// 0 when the bundle is empty.
    pub uid: u32,
    pub envelope: Envelope,
    /// RFC822.SIZE.
    pub size: u32,
    /// Volatile; see the module docs.
    pub flags: Vec<String>,
    /// Serialized BODYSTRUCTURE, as produced by
    /// [`crate::model::parts::serialize_body_structure`].
    pub serialized_body_structure: Vec<u8>,
}

/// The persistent cache consumed by the core and supplied by the embedder.
pub trait Cache {
    /// All known child mailboxes of `mailbox` (empty string: top level).
    fn child_mailboxes(&self, mailbox: &str) -> Vec<MailboxMetadata>;
    /// Is the result of [`Cache::child_mailboxes`] fresh enough to use
    /// without a LIST round-trip?
    fn child_mailboxes_fresh(&self, mailbox: &str) -> bool;
    fn set_child_mailboxes(&mut self, mailbox: &str, data: &[MailboxMetadata]);
    fn forget_child_mailboxes(&mut self, mailbox: &str);

    fn mailbox_sync_state(&self, mailbox: &str) -> SyncState;
    fn set_mailbox_sync_state(&mut self, mailbox: &str, state: &SyncState);

    /// Store the sequence→UID mapping, 0-based sequence order.
    fn set_uid_mapping(&mut self, mailbox: &str, seq_to_uid: &[u32]);
    fn clear_uid_mapping(&mut self, mailbox: &str);

    fn clear_all_messages(&mut self, mailbox: &str);
    fn clear_message(&mut self, mailbox: &str, uid: u32);

    fn set_msg_part(&mut self, mailbox: &str, uid: u32, part_id: &str, data: &[u8]);
    fn forget_msg_part(&mut self, mailbox: &str, uid: u32, part_id: &str);
    fn set_msg_envelope(&mut self, mailbox: &str, uid: u32, envelope: &Envelope);
    fn set_msg_size(&mut self, mailbox: &str, uid: u32, size: u32);
    fn set_msg_structure(&mut self, mailbox: &str, uid: u32, serialized: &[u8]);
    /// `flags` must already be normalized (sorted, deduplicated).
    fn set_msg_flags(&mut self, mailbox: &str, uid: u32, flags: &[String]);

    fn uid_mapping(&self, mailbox: &str) -> Vec<u32>;
    fn message_metadata(&self, mailbox: &str, uid: u32) -> MessageDataBundle;
    fn message_part(&self, mailbox: &str, uid: u32, part_id: &str) -> Option<Vec<u8>>;
}
