//! In-memory cache: the default backend, and the one every test uses.

use std::collections::HashMap;

use mainsail_proto::envelope::Envelope;

use crate::model::{metadata::MailboxMetadata, sync_state::SyncState};

use super::{Cache, MessageDataBundle};

#[derive(Debug, Clone, Default)]
struct CachedMessage {
    envelope: Option<Envelope>,
    size: Option<u32>,
    flags: Option<Vec<String>>,
    structure: Option<Vec<u8>>,
    parts: HashMap<String, Vec<u8>>,
}

/// Everything lives in maps; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    child_mailboxes: HashMap<String, Vec<MailboxMetadata>>,
    sync_states: HashMap<String, SyncState>,
    uid_maps: HashMap<String, Vec<u32>>,
    messages: HashMap<(String, u32), CachedMessage>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn message_mut(&mut self, mailbox: &str, uid: u32) -> &mut CachedMessage {
        self.messages
            .entry((mailbox.to_owned(), uid))
            .or_default()
    }
}

impl Cache for MemoryCache {
    fn child_mailboxes(&self, mailbox: &str) -> Vec<MailboxMetadata> {
        self.child_mailboxes.get(mailbox).cloned().unwrap_or_default()
    }

    fn child_mailboxes_fresh(&self, mailbox: &str) -> bool {
        self.child_mailboxes.contains_key(mailbox)
    }

    fn set_child_mailboxes(&mut self, mailbox: &str, data: &[MailboxMetadata]) {
        self.child_mailboxes
            .insert(mailbox.to_owned(), data.to_vec());
    }

    fn forget_child_mailboxes(&mut self, mailbox: &str) {
        self.child_mailboxes.remove(mailbox);
    }

    fn mailbox_sync_state(&self, mailbox: &str) -> SyncState {
        self.sync_states.get(mailbox).cloned().unwrap_or_default()
    }

    fn set_mailbox_sync_state(&mut self, mailbox: &str, state: &SyncState) {
        self.sync_states.insert(mailbox.to_owned(), state.clone());
    }

    fn set_uid_mapping(&mut self, mailbox: &str, seq_to_uid: &[u32]) {
        self.uid_maps.insert(mailbox.to_owned(), seq_to_uid.to_vec());
    }

    fn clear_uid_mapping(&mut self, mailbox: &str) {
        self.uid_maps.remove(mailbox);
    }

    fn clear_all_messages(&mut self, mailbox: &str) {
        self.messages.retain(|(owner, _), _| owner != mailbox);
    }

    fn clear_message(&mut self, mailbox: &str, uid: u32) {
        self.messages.remove(&(mailbox.to_owned(), uid));
    }

    fn set_msg_part(&mut self, mailbox: &str, uid: u32, part_id: &str, data: &[u8]) {
        self.message_mut(mailbox, uid)
            .parts
            .insert(part_id.to_owned(), data.to_vec());
    }

    fn forget_msg_part(&mut self, mailbox: &str, uid: u32, part_id: &str) {
        self.message_mut(mailbox, uid).parts.remove(part_id);
    }

    fn set_msg_envelope(&mut self, mailbox: &str, uid: u32, envelope: &Envelope) {
        self.message_mut(mailbox, uid).envelope = Some(envelope.clone());
    }

    fn set_msg_size(&mut self, mailbox: &str, uid: u32, size: u32) {
        self.message_mut(mailbox, uid).size = Some(size);
    }

    fn set_msg_structure(&mut self, mailbox: &str, uid: u32, serialized: &[u8]) {
        self.message_mut(mailbox, uid).structure = Some(serialized.to_vec());
    }

    fn set_msg_flags(&mut self, mailbox: &str, uid: u32, flags: &[String]) {
        self.message_mut(mailbox, uid).flags = Some(flags.to_vec());
    }

    fn uid_mapping(&self, mailbox: &str) -> Vec<u32> {
        self.uid_maps.get(mailbox).cloned().unwrap_or_default()
    }

    fn message_metadata(&self, mailbox: &str, uid: u32) -> MessageDataBundle {
        let Some(cached) = self.messages.get(&(mailbox.to_owned(), uid)) else {
            return MessageDataBundle::default();
        };

        MessageDataBundle {
            uid,
            envelope: cached.envelope.clone().unwrap_or_default(),
            size: cached.size.unwrap_or(0),
            flags: cached.flags.clone().unwrap_or_default(),
            serialized_body_structure: cached.structure.clone().unwrap_or_default(),
        }
    }

    fn message_part(&self, mailbox: &str, uid: u32, part_id: &str) -> Option<Vec<u8>> {
        self.messages
            .get(&(mailbox.to_owned(), uid))
            .and_then(|cached| cached.parts.get(part_id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_lifecycle() {
        let mut cache = MemoryCache::new();
        cache.set_msg_size("INBOX", 6, 1234);
        cache.set_msg_flags("INBOX", 6, &["\\Seen".into()]);
        cache.set_msg_part("INBOX", 6, "1", b"hello");
        cache.set_msg_part("INBOX", 6, "1.X-RAW", b"aGVsbG8=");

        let bundle = cache.message_metadata("INBOX", 6);
        assert_eq!(bundle.uid, 6);
        assert_eq!(bundle.size, 1234);
        assert_eq!(bundle.flags, vec!["\\Seen"]);

        assert_eq!(cache.message_part("INBOX", 6, "1").unwrap(), b"hello");
        assert_eq!(
            cache.message_part("INBOX", 6, "1.X-RAW").unwrap(),
            b"aGVsbG8="
        );
        assert!(cache.message_part("INBOX", 6, "2").is_none());

        cache.clear_message("INBOX", 6);
        assert_eq!(cache.message_metadata("INBOX", 6).uid, 0);
    }

    #[test]
    fn test_clear_all_is_per_mailbox() {
        let mut cache = MemoryCache::new();
        cache.set_msg_size("INBOX", 1, 10);
        cache.set_msg_size("Sent", 1, 20);

        cache.clear_all_messages("INBOX");
        assert_eq!(cache.message_metadata("INBOX", 1).size, 0);
        assert_eq!(cache.message_metadata("Sent", 1).size, 20);
    }

    #[test]
    fn test_uid_map_and_sync_state() {
        let mut cache = MemoryCache::new();
        let mut state = SyncState::default();
        state.set_exists(3);
        state.set_uid_next(15);
        state.set_uid_validity(333);

        cache.set_mailbox_sync_state("INBOX", &state);
        cache.set_uid_mapping("INBOX", &[6, 9, 10]);

        assert_eq!(cache.mailbox_sync_state("INBOX"), state);
        assert_eq!(cache.uid_mapping("INBOX"), vec![6, 9, 10]);

        cache.clear_uid_mapping("INBOX");
        assert!(cache.uid_mapping("INBOX").is_empty());
    }

    #[test]
    fn test_child_mailboxes_freshness() {
        let mut cache = MemoryCache::new();
        assert!(!cache.child_mailboxes_fresh(""));

        cache.set_child_mailboxes("", &[MailboxMetadata::new("INBOX", "/", vec![])]);
        assert!(cache.child_mailboxes_fresh(""));

        cache.forget_child_mailboxes("");
        assert!(!cache.child_mailboxes_fresh(""));
    }
}
