//! Per-mailbox synchronization state, as learned from SELECT.

use serde::{Deserialize, Serialize};

/// Everything the SELECT/EXAMINE conversation told us about a mailbox.
///
/// Every field carries a presence bit — missing server information must
/// never masquerade as a zero. The getters return 0 (or empty) for absent
/// values; use the `has_*` predicates when absence matters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncState {
    exists: Option<u32>,
    recent: Option<u32>,
    unseen_count: Option<u32>,
    unseen_offset: Option<u32>,
    uid_next: Option<u32>,
    uid_validity: Option<u32>,
    highest_mod_seq: Option<u64>,
    flags: Option<Vec<String>>,
    permanent_flags: Option<Vec<String>>,
}

impl SyncState {
    pub fn exists(&self) -> u32 {
        self.exists.unwrap_or(0)
    }

    pub fn recent(&self) -> u32 {
        self.recent.unwrap_or(0)
    }

    pub fn unseen_count(&self) -> u32 {
        self.unseen_count.unwrap_or(0)
    }

    pub fn unseen_offset(&self) -> u32 {
        self.unseen_offset.unwrap_or(0)
    }

    pub fn uid_next(&self) -> u32 {
        self.uid_next.unwrap_or(0)
    }

    pub fn uid_validity(&self) -> u32 {
        self.uid_validity.unwrap_or(0)
    }

    pub fn highest_mod_seq(&self) -> u64 {
        self.highest_mod_seq.unwrap_or(0)
    }

    pub fn flags(&self) -> &[String] {
        self.flags.as_deref().unwrap_or(&[])
    }

    pub fn permanent_flags(&self) -> &[String] {
        self.permanent_flags.as_deref().unwrap_or(&[])
    }

    pub fn has_exists(&self) -> bool {
        self.exists.is_some()
    }

    pub fn has_recent(&self) -> bool {
        self.recent.is_some()
    }

    pub fn has_unseen_count(&self) -> bool {
        self.unseen_count.is_some()
    }

    pub fn has_uid_next(&self) -> bool {
        self.uid_next.is_some()
    }

    pub fn has_uid_validity(&self) -> bool {
        self.uid_validity.is_some()
    }

    pub fn has_highest_mod_seq(&self) -> bool {
        self.highest_mod_seq.is_some()
    }

    pub fn set_exists(&mut self, exists: u32) {
        self.exists = Some(exists);
    }

    pub fn set_recent(&mut self, recent: u32) {
        self.recent = Some(recent);
    }

    pub fn set_unseen_count(&mut self, unseen: u32) {
        self.unseen_count = Some(unseen);
    }

    pub fn set_unseen_offset(&mut self, offset: u32) {
        self.unseen_offset = Some(offset);
    }

    pub fn set_uid_next(&mut self, uid_next: u32) {
        self.uid_next = Some(uid_next);
    }

    pub fn set_uid_validity(&mut self, uid_validity: u32) {
        self.uid_validity = Some(uid_validity);
    }

    pub fn set_highest_mod_seq(&mut self, highest_mod_seq: u64) {
        self.highest_mod_seq = Some(highest_mod_seq);
    }

    pub fn set_flags(&mut self, flags: Vec<String>) {
        self.flags = Some(flags);
    }

    pub fn set_permanent_flags(&mut self, flags: Vec<String>) {
        self.permanent_flags = Some(flags);
    }

    /// Enough information to show message counters? (EXISTS, RECENT and
    /// UNSEEN.)
    pub fn is_usable_for_numbers(&self) -> bool {
        self.exists.is_some() && self.recent.is_some() && self.unseen_count.is_some()
    }

    /// Enough information for a delta sync? EXISTS, UIDNEXT and
    /// UIDVALIDITY are required; RECENT and friends are not.
    pub fn is_usable_for_syncing(&self) -> bool {
        self.exists.is_some() && self.uid_next.is_some() && self.uid_validity.is_some()
    }

    /// CONDSTORE-grade state: syncable plus a real HIGHESTMODSEQ.
    pub fn is_usable_for_condstore(&self) -> bool {
        self.is_usable_for_syncing() && self.highest_mod_seq() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_bits() {
        let mut state = SyncState::default();
        assert_eq!(state.exists(), 0);
        assert!(!state.has_exists());
        assert!(!state.is_usable_for_syncing());

        state.set_exists(0);
        assert_eq!(state.exists(), 0);
        assert!(state.has_exists());

        state.set_uid_next(1);
        state.set_uid_validity(666);
        assert!(state.is_usable_for_syncing());
        assert!(!state.is_usable_for_numbers());
        assert!(!state.is_usable_for_condstore());

        state.set_highest_mod_seq(33);
        assert!(state.is_usable_for_condstore());
    }

    #[test]
    fn test_serde_round_trip_preserves_presence() {
        let mut state = SyncState::default();
        state.set_exists(3);
        state.set_uid_next(15);
        state.set_uid_validity(333);
        state.set_permanent_flags(vec!["\\Seen".into(), "\\*".into()]);

        let encoded = serde_json::to_vec(&state).unwrap();
        let decoded: SyncState = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(state, decoded);

        // absent stays absent, not zero
        assert!(!decoded.has_recent());
        assert!(!decoded.has_highest_mod_seq());
        assert_eq!(decoded.permanent_flags().len(), 2);
    }
}
