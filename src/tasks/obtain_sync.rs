//! Mailbox synchronization: from "closed" to "selected and reconciled".
//!
//! Given the cached `(SyncState, uid map, flags)` and the fresh SELECT
//! conversation, the task brings the in-memory list and the cache to the
//! authoritative server state while absorbing EXPUNGE/EXISTS/VANISHED
//! updates that interleave with its own commands.
//!
//! The cache is written exactly once, at the very end, as one logical
//! unit of sync state plus UID map; a task that fails leaves the cache
//! untouched.

use mainsail_proto::{
    command::{CommandBody, FetchAttr, QresyncParams},
    response::{RespCode, Response, SocketEvent, State, StateKind},
    sequence::SequenceSet,
};

use crate::{
    error::Error,
    events::Event,
    model::{
        metadata::MailboxMetadata,
        sync_state::SyncState,
        tree::{FetchState, NodeId},
        Model,
    },
    tasks::{Claim, Outgoing, Task, TaskOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Selecting,
    UidSearching,
    UidSearchingTail,
    FlagsFetching,
    Done,
    Failed,
}

/// Which reconciliation branch the cache comparison picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncMode {
    /// No usable cache (or UIDVALIDITY changed): learn everything.
    Full,
    /// EXISTS grew; only the tail is new.
    Arrivals,
    /// EXISTS shrank; diff the UID map against a full search.
    ExpungeDiff,
    /// EXISTS unchanged; flags only.
    FlagsOnly,
}

/// The `ObtainSynchronizedMailbox` task.
pub struct ObtainSynchronizedMailbox {
    mailbox_name: String,
    node: Option<NodeId>,
    phase: Phase,
    mode: SyncMode,
    select_tag: Option<String>,
    search_tag: Option<String>,
    flags_tag: Option<String>,
    /// UID FETCH tags covering arrivals the search missed.
    tail_tags: Vec<String>,
    flags_done: bool,
    cached: SyncState,
    cached_map: Vec<u32>,
    server: SyncState,
    search_result: Option<Vec<u32>>,
    /// EXISTS grew while the search was in flight.
    extra_exists: bool,
    aborted: bool,
    outcome: TaskOutcome,
}

impl ObtainSynchronizedMailbox {
    pub fn new(mailbox_name: String) -> Self {
        Self {
            mailbox_name,
            node: None,
            phase: Phase::Selecting,
            mode: SyncMode::Full,
            select_tag: None,
            search_tag: None,
            flags_tag: None,
            tail_tags: Vec::new(),
            flags_done: false,
            cached: SyncState::default(),
            cached_map: Vec::new(),
            server: SyncState::default(),
            search_result: None,
            extra_exists: false,
            aborted: false,
            outcome: TaskOutcome::Running,
        }
    }

    pub fn mailbox(&self) -> &str {
        &self.mailbox_name
    }

    fn fail(&mut self, error: Error) {
        self.phase = Phase::Failed;
        self.outcome = TaskOutcome::Failed(error);
    }

    fn node_or_die(&self) -> NodeId {
        self.node.expect("activate() resolved the mailbox node")
    }

    fn is_tag(&self, holder: &Option<String>, response: &Response) -> bool {
        matches!((holder, response.completion_tag()), (Some(mine), Some(theirs)) if mine == theirs)
    }

    // ----- the cache comparison (the "Deciding" step) -----

    fn decide(&mut self, model: &mut Model, out: &mut Outgoing) {
        let node = self.node_or_die();
        let list = model.tree.message_list_of(node);
        let exists = self.server.exists();

        *model.sync_state_mut(&self.mailbox_name) = self.server.clone();

        let uid_validity_changed = self.cached.has_uid_validity()
            && self.server.has_uid_validity()
            && self.cached.uid_validity() != self.server.uid_validity();
        let uid_next_went_backwards = !uid_validity_changed
            && self.cached.has_uid_next()
            && self.server.has_uid_next()
            && self.server.uid_next() < self.cached.uid_next();

        if uid_validity_changed || uid_next_went_backwards {
            if uid_validity_changed {
                log::warn!(
                    "{}: UIDVALIDITY changed from {} to {}, discarding cached data",
                    self.mailbox_name,
                    self.cached.uid_validity(),
                    self.server.uid_validity()
                );
            } else {
                log::error!(
                    "{}: UIDNEXT decreased from {} to {} without a UIDVALIDITY change; \
                     this is a server bug, discarding cached data",
                    self.mailbox_name,
                    self.cached.uid_next(),
                    self.server.uid_next()
                );
                model.push_error(
                    node,
                    "Protocol error",
                    format!(
                        "UIDNEXT decreased from {} to {} while UIDVALIDITY stayed {}",
                        self.cached.uid_next(),
                        self.server.uid_next(),
                        self.server.uid_validity()
                    ),
                );
            }

            // everything cached about messages in this mailbox is garbage
            model.cache.clear_all_messages(&self.mailbox_name);
            model.cache.clear_uid_mapping(&self.mailbox_name);
            self.cached = SyncState::default();
            self.cached_map.clear();

            let removed = model.tree.clear_messages(list);
            if removed > 0 {
                model.events.push(Event::RowsRemoved {
                    parent: list,
                    first: 0,
                    count: removed,
                });
            }
        }

        if !self.cached.is_usable_for_syncing() || !self.server.is_usable_for_syncing() {
            // no delta to compute; learn the mailbox from scratch
            self.mode = SyncMode::Full;
            if exists == 0 {
                let removed = model.tree.clear_messages(list);
                if removed > 0 {
                    model.events.push(Event::RowsRemoved {
                        parent: list,
                        first: 0,
                        count: removed,
                    });
                }
                self.finalize(model);
                return;
            }
            self.reset_placeholders(model, list, exists as usize);
            self.search_tag = Some(out.emit(CommandBody::Search {
                uid: true,
                criteria: String::from("ALL"),
                return_all: false,
            }));
            self.phase = Phase::UidSearching;
            return;
        }

        // VANISHED (EARLIER) and EXPUNGE seen during the SELECT itself have
        // already been applied to the in-memory list; compare against what
        // is really there, not against the stale cached counter
        let cached_exists = model.tree.node(list).children.len() as u32;

        if exists == cached_exists {
            self.mode = SyncMode::FlagsOnly;
            if exists == 0 {
                self.finalize(model);
                return;
            }
            self.emit_flags_fetch(model, out);
            return;
        }

        if exists > cached_exists {
            self.mode = SyncMode::Arrivals;
            let current = model.tree.node(list).children.len();
            if (exists as usize) > current {
                let first = model
                    .tree
                    .append_placeholder_messages(list, exists as usize - current);
                model.events.push(Event::RowsInserted {
                    parent: list,
                    first,
                    count: exists as usize - current,
                });
            }
            self.search_tag = Some(out.emit(CommandBody::Search {
                uid: true,
                criteria: format!("UID {}:*", self.cached.uid_next()),
                return_all: false,
            }));
            self.phase = Phase::UidSearchingTail;
            return;
        }

        // messages disappeared while the mailbox was closed
        self.mode = SyncMode::ExpungeDiff;
        self.search_tag = Some(out.emit(CommandBody::Search {
            uid: true,
            criteria: String::from("ALL"),
            return_all: false,
        }));
        self.phase = Phase::UidSearching;
    }

    fn reset_placeholders(&mut self, model: &mut Model, list: NodeId, count: usize) {
        let removed = model.tree.clear_messages(list);
        if removed > 0 {
            model.events.push(Event::RowsRemoved {
                parent: list,
                first: 0,
                count: removed,
            });
        }
        model.tree.append_placeholder_messages(list, count);
        model.events.push(Event::RowsInserted {
            parent: list,
            first: 0,
            count,
        });
    }

    fn emit_flags_fetch(&mut self, model: &mut Model, out: &mut Outgoing) {
        let node = self.node_or_die();
        let list = model.tree.message_list_of(node);
        let count = model.tree.node(list).children.len() as u32;
        if count == 0 {
            self.finalize(model);
            return;
        }
        self.flags_tag = Some(out.emit(CommandBody::Fetch {
            uid: false,
            sequence: SequenceSet::range(1, count),
            items: vec![FetchAttr::Flags],
        }));
        self.phase = Phase::FlagsFetching;
    }

    // ----- search result application -----

    fn apply_search(&mut self, model: &mut Model, out: &mut Outgoing) {
        let node = self.node_or_die();
        let list = model.tree.message_list_of(node);
        let mut result = self.search_result.take().unwrap_or_default();
        result.sort_unstable();
        result.dedup();

        let target: Vec<u32> = match self.mode {
            SyncMode::Full | SyncMode::ExpungeDiff => {
                if self.mode == SyncMode::ExpungeDiff {
                    // cached messages absent from the authoritative set are
                    // gone for good, cache included
                    for &uid in &self.cached_map {
                        if uid != 0 && result.binary_search(&uid).is_err() {
                            model.cache.clear_message(&self.mailbox_name, uid);
                        }
                    }
                }
                result
            }
            SyncMode::Arrivals => {
                // the server echoes at least one old message for a
                // "UID n:*" probe when nothing is new; keep genuinely new
                // UIDs only
                let new: Vec<u32> = result
                    .into_iter()
                    .filter(|&uid| uid >= self.cached.uid_next())
                    .collect();
                let mut target: Vec<u32> = model
                    .tree
                    .uid_map(list)
                    .into_iter()
                    .filter(|&uid| uid != 0)
                    .collect();
                target.extend(new);
                target
            }
            SyncMode::FlagsOnly => unreachable!("flags-only mode never searches"),
        };

        self.reconcile_list(model, list, &target);

        if self.extra_exists {
            // arrivals announced while the search was running are not in
            // its result; give them their rows back and sweep them by UID
            let want = self.server.exists() as usize;
            let have = model.tree.node(list).children.len();
            if want > have {
                let first = model.tree.append_placeholder_messages(list, want - have);
                model.events.push(Event::RowsInserted {
                    parent: list,
                    first,
                    count: want - have,
                });
            }
            let next = target.iter().copied().max().unwrap_or(0) + 1;
            self.tail_tags.push(out.emit(CommandBody::Fetch {
                uid: true,
                sequence: SequenceSet::from(next),
                items: vec![FetchAttr::Flags],
            }));
            self.extra_exists = false;
        }

        self.emit_flags_fetch(model, out);
    }

    /// Make the message list match `target` (a sorted UID list), reusing
    /// live nodes by UID, filling placeholders in order, dropping the
    /// rest.
    fn reconcile_list(&mut self, model: &mut Model, list: NodeId, target: &[u32]) {
        let old_children = model.tree.node(list).children.clone();
        let old_count = old_children.len();

        let mut by_uid: Vec<(u32, NodeId)> = Vec::new();
        let mut placeholders: Vec<NodeId> = Vec::new();
        for &child in &old_children {
            match model.tree.node(child).as_message().map_or(0, |m| m.uid) {
                0 => placeholders.push(child),
                uid => by_uid.push((uid, child)),
            }
        }

        let mut placeholders = placeholders.into_iter();
        let mut new_children: Vec<NodeId> = Vec::with_capacity(target.len());
        let mut used: Vec<NodeId> = Vec::new();

        for &uid in target {
            if let Some(position) = by_uid.iter().position(|&(u, _)| u == uid) {
                let (_, id) = by_uid.remove(position);
                new_children.push(id);
                used.push(id);
            } else if let Some(placeholder) = placeholders.next() {
                if let Some(message) = model.tree.node_mut(placeholder).as_message_mut() {
                    message.uid = uid;
                }
                new_children.push(placeholder);
                used.push(placeholder);
            } else {
                let first = model.tree.append_placeholder_messages(list, 1);
                let id = model
                    .tree
                    .message_at(list, first)
                    .expect("placeholder just appended");
                if let Some(message) = model.tree.node_mut(id).as_message_mut() {
                    message.uid = uid;
                }
                new_children.push(id);
                used.push(id);
            }
        }

        // anything left over is gone from the server
        let leftovers: Vec<NodeId> = by_uid
            .into_iter()
            .map(|(_, id)| id)
            .chain(placeholders)
            .collect();
        for id in leftovers {
            model.tree.remove_subtree(id);
        }

        model.tree.node_mut(list).children = new_children;

        if old_count != target.len() {
            model.events.push(Event::RowsRemoved {
                parent: list,
                first: 0,
                count: old_count,
            });
            model.events.push(Event::RowsInserted {
                parent: list,
                first: 0,
                count: target.len(),
            });
        } else {
            model.events.push(Event::DataChanged { node: list });
        }
    }

    // ----- completion -----

    fn finalize(&mut self, model: &mut Model) {
        let node = self.node_or_die();
        let list = model.tree.message_list_of(node);
        let map = model.tree.uid_map(list);

        // UID-sorted sequence sanity: non-decreasing over known UIDs
        let mut last = 0u32;
        for &uid in map.iter().filter(|&&uid| uid != 0) {
            if uid < last {
                log::error!(
                    "{}: UID map is not ascending ({uid} after {last})",
                    self.mailbox_name
                );
            }
            last = uid.max(last);
        }

        let max_uid = map.iter().copied().max().unwrap_or(0);
        let state = model.sync_state_mut(&self.mailbox_name);
        state.set_exists(map.len() as u32);
        if max_uid > 0 && max_uid + 1 > state.uid_next() {
            state.set_uid_next(max_uid + 1);
        }

        // the one logical cache transaction of the whole sync
        model.commit_sync_state(node);

        model.tree.node_mut(list).fetch_state = FetchState::Done;
        model.refresh_counts(list);
        model.events.push(Event::DataChanged { node });

        self.phase = Phase::Done;
        self.outcome = TaskOutcome::Done;
    }

    // ----- untagged traffic common to several phases -----

    fn handle_untagged_sync_info(&mut self, model: &mut Model, response: &Response) -> Option<Claim> {
        let node = self.node_or_die();
        match response {
            Response::Recent(n) => {
                self.server.set_recent(*n);
                model.sync_state_mut(&self.mailbox_name).set_recent(*n);
                Some(Claim::Claimed)
            }
            Response::Flags(flags) => {
                self.server.set_flags(flags.clone());
                model
                    .sync_state_mut(&self.mailbox_name)
                    .set_flags(flags.clone());
                Some(Claim::Claimed)
            }
            Response::State(State { tag: None, code: Some(code), .. }) => {
                match code {
                    RespCode::UidNext(n) => self.server.set_uid_next(*n),
                    RespCode::UidValidity(n) => self.server.set_uid_validity(*n),
                    RespCode::Unseen(n) => self.server.set_unseen_offset(*n),
                    RespCode::HighestModSeq(n) => self.server.set_highest_mod_seq(*n),
                    RespCode::NoModSeq => {}
                    RespCode::PermanentFlags(flags) => {
                        self.server.set_permanent_flags(flags.clone())
                    }
                    RespCode::ReadOnly | RespCode::ReadWrite => {}
                    _ => return None,
                }
                *model.sync_state_mut(&self.mailbox_name) = self.server.clone();
                Some(Claim::Claimed)
            }
            Response::Vanished(vanished) if vanished.earlier => {
                model.apply_vanished(node, &vanished.uids, true);
                Some(Claim::Claimed)
            }
            Response::Vanished(vanished) => {
                model.apply_vanished(node, &vanished.uids, false);
                Some(Claim::Claimed)
            }
            Response::Expunge(seq) => {
                let drop_cache = self.phase == Phase::FlagsFetching;
                match model.apply_expunge(node, *seq, drop_cache) {
                    Ok(_) => Some(Claim::Claimed),
                    Err(error) => {
                        // recovery policy: treat as broken mailbox state,
                        // drop the per-message cache and start over
                        model.cache.clear_all_messages(&self.mailbox_name);
                        model.cache.clear_uid_mapping(&self.mailbox_name);
                        model.mark_force_full_resync(&self.mailbox_name);
                        self.fail(error);
                        Some(Claim::Claimed)
                    }
                }
            }
            Response::Fetch(fetch) => match model.apply_fetch(node, fetch) {
                Ok(()) => Some(Claim::Claimed),
                Err(error) => {
                    self.fail(error);
                    Some(Claim::Claimed)
                }
            },
            _ => None,
        }
    }
}

impl Task for ObtainSynchronizedMailbox {
    fn name(&self) -> &'static str {
        "obtain-synchronized-mailbox"
    }

    fn activate(&mut self, model: &mut Model, out: &mut Outgoing) {
        let node = match model.tree.find_mailbox(&self.mailbox_name) {
            Some(node) => node,
            None => {
                // selecting a mailbox the LIST never mentioned; give it a
                // bare node so the tree can host its messages
                let root = model.tree.root();
                model
                    .tree
                    .create_mailbox(root, MailboxMetadata::new(self.mailbox_name.clone(), "", vec![]))
            }
        };
        self.node = Some(node);

        let force_full = model.take_force_full_resync(&self.mailbox_name)
            || model.config.cache_loading_mode
                == crate::config::CacheLoadingMode::ForceReload;

        if !force_full {
            model.seed_list_from_cache(node);
            self.cached = model.cache.mailbox_sync_state(&self.mailbox_name);
            self.cached_map = model.cache.uid_mapping(&self.mailbox_name);
        }

        if self.cached.exists() as usize != self.cached_map.len() {
            // the two are written as a unit; a mismatch means a torn cache
            if self.cached.has_exists() || !self.cached_map.is_empty() {
                log::warn!(
                    "{}: cached EXISTS {} does not match cached UID map length {}, ignoring cache",
                    self.mailbox_name,
                    self.cached.exists(),
                    self.cached_map.len()
                );
            }
            self.cached = SyncState::default();
            self.cached_map.clear();
        }

        let list = model.tree.message_list_of(node);
        model.tree.node_mut(list).fetch_state = FetchState::Loading;

        let qresync = if model.has_capability("QRESYNC") && self.cached.is_usable_for_condstore() {
            Some(QresyncParams {
                uid_validity: self.cached.uid_validity(),
                highest_mod_seq: self.cached.highest_mod_seq(),
                known_uids: {
                    let known: Vec<u32> = self
                        .cached_map
                        .iter()
                        .copied()
                        .filter(|&uid| uid != 0)
                        .collect();
                    if known.is_empty() {
                        None
                    } else {
                        Some(SequenceSet::from_sorted(&known))
                    }
                },
            })
        } else {
            None
        };

        self.select_tag = Some(out.emit(CommandBody::Select {
            mailbox: self.mailbox_name.clone(),
            qresync,
        }));
        self.phase = Phase::Selecting;
    }

    fn handle(&mut self, model: &mut Model, out: &mut Outgoing, response: &Response) -> Claim {
        if matches!(self.phase, Phase::Done | Phase::Failed) {
            return Claim::NotMine;
        }

        match response {
            Response::Socket(SocketEvent::Disconnected { reason }) => {
                self.fail(Error::Disconnected(reason.clone()));
                return Claim::Claimed;
            }
            Response::State(State { tag: None, kind: StateKind::Bye, text, .. }) => {
                self.fail(Error::Disconnected(format!("BYE: {text}")));
                return Claim::NotMine; // the scheduler needs to see BYE too
            }
            _ => {}
        }

        match self.phase {
            Phase::Selecting => {
                if let Response::Exists(n) = response {
                    self.server.set_exists(*n);
                    return Claim::Claimed;
                }
                if let Some(claim) = self.handle_untagged_sync_info(model, response) {
                    return claim;
                }
                if self.is_tag(&self.select_tag.clone(), response) {
                    let Response::State(state) = response else {
                        return Claim::NotMine;
                    };
                    match state.kind {
                        StateKind::Ok => {
                            if self.aborted {
                                self.fail(Error::Aborted(String::from(
                                    "mailbox sync cancelled",
                                )));
                            } else {
                                self.decide(model, out);
                            }
                        }
                        _ => {
                            // SELECT denied: unavailable, no cache writes
                            let node = self.node_or_die();
                            let list = model.tree.message_list_of(node);
                            model.tree.node_mut(list).fetch_state = FetchState::Unavailable;
                            model.tree.node_mut(node).fetch_state = FetchState::Unavailable;
                            model.events.push(Event::DataChanged { node });
                            self.fail(Error::Server {
                                kind: state.kind,
                                text: state.text.clone(),
                            });
                        }
                    }
                    return Claim::Claimed;
                }
                Claim::NotMine
            }

            Phase::UidSearching | Phase::UidSearchingTail => {
                match response {
                    Response::Search(numbers) => {
                        self.search_result = Some(numbers.clone());
                        return Claim::Claimed;
                    }
                    Response::ESearch(esearch) => {
                        let all = esearch
                            .list_data
                            .iter()
                            .find(|(label, _)| label == "ALL")
                            .and_then(|(_, set)| set.expand_finite())
                            .unwrap_or_default();
                        self.search_result = Some(all);
                        return Claim::Claimed;
                    }
                    Response::Exists(n) => {
                        let node = self.node_or_die();
                        let list = model.tree.message_list_of(node);
                        let current = model.tree.node(list).children.len();
                        match (*n as usize).cmp(&current) {
                            std::cmp::Ordering::Greater => {
                                let count = *n as usize - current;
                                let first =
                                    model.tree.append_placeholder_messages(list, count);
                                model.events.push(Event::RowsInserted {
                                    parent: list,
                                    first,
                                    count,
                                });
                                self.extra_exists = true;
                            }
                            std::cmp::Ordering::Less => {
                                self.fail(Error::Mailbox {
                                    mailbox: self.mailbox_name.clone(),
                                    message: format!(
                                        "untagged EXISTS dropped from {current} to {n}"
                                    ),
                                });
                            }
                            std::cmp::Ordering::Equal => {}
                        }
                        self.server.set_exists(*n);
                        return Claim::Claimed;
                    }
                    _ => {}
                }
                if let Some(claim) = self.handle_untagged_sync_info(model, response) {
                    return claim;
                }
                if self.is_tag(&self.search_tag.clone(), response) {
                    let Response::State(state) = response else {
                        return Claim::NotMine;
                    };
                    match state.kind {
                        StateKind::Ok => {
                            if self.aborted {
                                self.fail(Error::Aborted(String::from(
                                    "mailbox sync cancelled",
                                )));
                            } else if self.search_result.is_none() {
                                self.fail(Error::UnexpectedResponse(String::from(
                                    "UID SEARCH completed without a SEARCH response",
                                )));
                            } else {
                                self.apply_search(model, out);
                            }
                        }
                        _ => {
                            // next attempt starts from zero; cache stays as
                            // it was
                            model.mark_force_full_resync(&self.mailbox_name);
                            let node = self.node_or_die();
                            let list = model.tree.message_list_of(node);
                            model.tree.node_mut(list).fetch_state = FetchState::None;
                            self.fail(Error::Server {
                                kind: state.kind,
                                text: state.text.clone(),
                            });
                        }
                    }
                    return Claim::Claimed;
                }
                Claim::NotMine
            }

            Phase::FlagsFetching => {
                match response {
                    Response::Exists(n) => {
                        // yet more arrivals; stretch the list and sweep by
                        // UID after the current fetch
                        let node = self.node_or_die();
                        let list = model.tree.message_list_of(node);
                        let current = model.tree.node(list).children.len();
                        if (*n as usize) > current {
                            let count = *n as usize - current;
                            let first = model.tree.append_placeholder_messages(list, count);
                            model.events.push(Event::RowsInserted {
                                parent: list,
                                first,
                                count,
                            });
                            let max_uid = model
                                .tree
                                .uid_map(list)
                                .into_iter()
                                .max()
                                .unwrap_or(0);
                            self.tail_tags.push(out.emit(CommandBody::Fetch {
                                uid: true,
                                sequence: SequenceSet::from(max_uid + 1),
                                items: vec![FetchAttr::Flags],
                            }));
                        }
                        self.server.set_exists(*n);
                        return Claim::Claimed;
                    }
                    _ => {}
                }
                if let Some(claim) = self.handle_untagged_sync_info(model, response) {
                    return claim;
                }

                let flags_completed = self.is_tag(&self.flags_tag.clone(), response);
                let tail_completed = response
                    .completion_tag()
                    .is_some_and(|tag| self.tail_tags.iter().any(|mine| mine == tag));

                if flags_completed || tail_completed {
                    let Response::State(state) = response else {
                        return Claim::NotMine;
                    };
                    if state.kind != StateKind::Ok {
                        self.fail(Error::Server {
                            kind: state.kind,
                            text: state.text.clone(),
                        });
                        return Claim::Claimed;
                    }
                    if flags_completed {
                        self.flags_done = true;
                    }
                    if tail_completed {
                        let tag = response.completion_tag().expect("checked above");
                        self.tail_tags.retain(|mine| mine != tag);
                    }
                    if self.flags_done && self.tail_tags.is_empty() {
                        if self.aborted {
                            self.fail(Error::Aborted(String::from("mailbox sync cancelled")));
                        } else {
                            self.finalize(model);
                        }
                    }
                    return Claim::Claimed;
                }
                Claim::NotMine
            }

            Phase::Done | Phase::Failed => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.outcome.clone()
    }

    fn abort(&mut self, reason: &str) {
        log::debug!("{}: sync aborted: {reason}", self.mailbox_name);
        self.aborted = true;
    }

    fn target_node(&self) -> Option<NodeId> {
        self.node
    }
}
