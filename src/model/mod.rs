//! The in-memory model: tree, cache adapter, and query interface.

pub mod flags;
pub mod metadata;
pub mod parts;
pub mod roles;
pub mod sync_state;
pub mod tree;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use mainsail_proto::{
    extensions::namespace::NamespaceResponse,
    fetch::{FetchItem, FetchResponse},
    response::ListResponse,
    rfc5322,
};

use crate::{
    cache::Cache,
    config::{CacheLoadingMode, Config},
    error::Error,
    events::{Event, EventQueue},
    model::{
        flags::FlagStore,
        metadata::MailboxMetadata,
        roles::{Role, Value},
        sync_state::SyncState,
        tree::{FetchState, NodeId, NodeKind, SpecialKind, Tree},
    },
};

/// Decodes transfer-encoded part bytes. Supplied by the embedder; MIME
/// decoding is out of this crate's scope.
pub trait ContentDecoder {
    fn decode(&self, data: &[u8], transfer_encoding: &str) -> Vec<u8>;
}

/// The default decoder: hands bytes through untouched.
#[derive(Debug, Default)]
pub struct IdentityDecoder;

impl ContentDecoder for IdentityDecoder {
    fn decode(&self, data: &[u8], _transfer_encoding: &str) -> Vec<u8> {
        data.to_vec()
    }
}

/// Work the model wants the scheduler to do on its behalf. Produced by
/// lazy-loading queries, drained by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRequest {
    /// Select + synchronize the mailbox holding this node.
    SyncMailbox(NodeId),
    /// LIST the child mailboxes of this mailbox.
    ListChildren(NodeId),
    /// Fetch envelope/size/structure for this message.
    FetchMessageMetadata(NodeId),
    /// Fetch the payload of this part (or pseudo-part).
    FetchPart(NodeId),
}

/// The model: the tree, its cache, and everything queries need.
pub struct Model {
    pub tree: Tree,
    pub cache: Box<dyn Cache>,
    pub flags: FlagStore,
    pub events: EventQueue,
    pub config: Config,
    /// Capabilities of the current connection, uppercased.
    capabilities: Vec<String>,
    /// Extensions confirmed via `* ENABLED`, uppercased.
    enabled: Vec<String>,
    /// The server's ID response, when it sent one.
    pub server_id: Option<Vec<(String, String)>>,
    /// The NAMESPACE answer, when fetched.
    pub namespace: Option<NamespaceResponse>,
    /// The most recent GENURLAUTH result.
    pub genurlauth: Option<String>,
    /// Live sync state per mailbox name (the cache holds the durable one).
    sync_states: HashMap<String, SyncState>,
    /// Immutable metadata items seen before their message's UID; keyed by
    /// (mailbox name, sequence number).
    deferred: HashMap<(String, u32), Vec<FetchItem>>,
    requests: Vec<ModelRequest>,
    decoder: Box<dyn ContentDecoder>,
    now: Option<DateTime<FixedOffset>>,
    /// Mailboxes whose next sync must be a full one (a UID SEARCH failed).
    force_full: HashSet<String>,
}

impl Model {
    pub fn new(cache: Box<dyn Cache>, config: Config) -> Self {
        Self {
            tree: Tree::new(),
            cache,
            flags: FlagStore::new(),
            events: EventQueue::default(),
            config,
            capabilities: Vec::new(),
            enabled: Vec::new(),
            server_id: None,
            namespace: None,
            genurlauth: None,
            sync_states: HashMap::new(),
            deferred: HashMap::new(),
            requests: Vec::new(),
            decoder: Box::new(IdentityDecoder),
            now: None,
            force_full: HashSet::new(),
        }
    }

    pub fn set_decoder(&mut self, decoder: Box<dyn ContentDecoder>) {
        self.decoder = decoder;
    }

    /// Wall-clock reference for fuzzy dates, provided by the embedder's
    /// timer tick.
    pub fn set_now(&mut self, now: DateTime<FixedOffset>) {
        self.now = Some(now);
    }

    // ----- capabilities -----

    pub fn set_capabilities(&mut self, caps: &[String]) {
        self.capabilities = caps.iter().map(|c| c.to_ascii_uppercase()).collect();
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c == &name.to_ascii_uppercase())
    }

    pub fn note_enabled(&mut self, extension: &str) {
        let upper = extension.to_ascii_uppercase();
        if !self.enabled.contains(&upper) {
            self.enabled.push(upper);
        }
    }

    pub fn is_enabled(&self, extension: &str) -> bool {
        self.enabled.contains(&extension.to_ascii_uppercase())
    }

    // ----- sync state -----

    pub fn sync_state(&self, mailbox: &str) -> Option<&SyncState> {
        self.sync_states.get(mailbox)
    }

    pub fn sync_state_mut(&mut self, mailbox: &str) -> &mut SyncState {
        self.sync_states.entry(mailbox.to_owned()).or_default()
    }

    pub fn drop_sync_state(&mut self, mailbox: &str) {
        self.sync_states.remove(mailbox);
    }

    /// Force the next synchronization of this mailbox to take the full
    /// path, without touching the cache.
    pub fn mark_force_full_resync(&mut self, mailbox: &str) {
        self.force_full.insert(mailbox.to_owned());
    }

    pub fn take_force_full_resync(&mut self, mailbox: &str) -> bool {
        self.force_full.remove(mailbox)
    }

    /// Persist the sync state and the sequence→UID map as one logical
    /// unit. This is the only place either of them gets written.
    pub fn commit_sync_state(&mut self, mailbox: NodeId) {
        let Some(name) = self
            .tree
            .node(mailbox)
            .as_mailbox()
            .map(|m| m.metadata.mailbox.clone())
        else {
            return;
        };
        let list = self.tree.message_list_of(mailbox);
        let map = self.tree.uid_map(list);
        let state = self.sync_states.get(&name).cloned().unwrap_or_default();

        self.cache.set_mailbox_sync_state(&name, &state);
        self.cache.set_uid_mapping(&name, &map);
    }

    /// Seed the in-memory message list from the cached UID map, so that a
    /// reconciliation starts from what the last session knew.
    pub fn seed_list_from_cache(&mut self, mailbox: NodeId) {
        let Some(name) = self
            .tree
            .node(mailbox)
            .as_mailbox()
            .map(|m| m.metadata.mailbox.clone())
        else {
            return;
        };
        let list = self.tree.message_list_of(mailbox);
        if !self.tree.node(list).children.is_empty() {
            return;
        }

        let map = self.cache.uid_mapping(&name);
        if map.is_empty() {
            return;
        }

        self.tree.append_placeholder_messages(list, map.len());
        for (offset, &uid) in map.iter().enumerate() {
            if let Some(id) = self.tree.message_at(list, offset) {
                if let Some(message) = self.tree.node_mut(id).as_message_mut() {
                    message.uid = uid;
                }
            }
        }
        self.events.push(Event::RowsInserted {
            parent: list,
            first: 0,
            count: map.len(),
        });
    }

    // ----- requests -----

    pub fn take_requests(&mut self) -> Vec<ModelRequest> {
        std::mem::take(&mut self.requests)
    }

    fn request(&mut self, request: ModelRequest) {
        if !self.requests.contains(&request) {
            self.requests.push(request);
        }
    }

    // ----- node bookkeeping helpers -----

    /// Full name of the mailbox that owns a node.
    pub fn mailbox_name_of(&self, id: NodeId) -> Option<String> {
        let mailbox = self.tree.owning_mailbox(id)?;
        self.tree
            .node(mailbox)
            .as_mailbox()
            .map(|m| m.metadata.mailbox.clone())
    }

    fn data_changed(&mut self, node: NodeId) {
        self.events.push(Event::DataChanged { node });
    }

    pub fn push_error(&mut self, node: NodeId, short_message: &str, long_message: String) {
        let path = self.tree.describe(node);
        self.events.push(Event::Error {
            path,
            short_message: short_message.to_owned(),
            long_message,
        });
    }

    // ----- view interface -----

    /// Child row count, triggering lazy loads exactly like the data roles.
    pub fn row_count(&mut self, id: NodeId) -> usize {
        match &self.tree.node(id).kind {
            NodeKind::Mailbox(_) => {
                self.ensure_children_listed(id);
                self.tree.node(id).children.len()
            }
            NodeKind::MessageList(_) => {
                if self.tree.node(id).fetch_state == FetchState::None {
                    self.tree.node_mut(id).fetch_state = FetchState::Loading;
                    self.request(ModelRequest::SyncMailbox(id));
                }
                self.tree.node(id).children.len()
            }
            _ => self.tree.node(id).children.len(),
        }
    }

    fn ensure_children_listed(&mut self, mailbox: NodeId) {
        if self.tree.node(mailbox).fetch_state != FetchState::None {
            return;
        }

        let name = self
            .tree
            .node(mailbox)
            .as_mailbox()
            .map(|m| m.metadata.mailbox.clone())
            .unwrap_or_default();

        if self.config.cache_loading_mode == CacheLoadingMode::CachedIsOk
            && self.cache.child_mailboxes_fresh(&name)
        {
            let cached = self.cache.child_mailboxes(&name);
            let (removed, inserted) = self.tree.set_child_mailboxes(mailbox, &cached);
            if removed + inserted > 0 {
                self.events.push(Event::RowsInserted {
                    parent: mailbox,
                    first: 1,
                    count: inserted,
                });
            }
            return;
        }

        self.tree.node_mut(mailbox).fetch_state = FetchState::Loading;
        self.request(ModelRequest::ListChildren(mailbox));
    }

    /// The answer for one role on one node.
    pub fn data(&mut self, id: NodeId, role: Role) -> Value {
        match role {
            Role::IsFetched => {
                return Value::Bool(self.tree.node(id).fetch_state == FetchState::Done)
            }
            Role::IsUnavailable => {
                return Value::Bool(self.tree.node(id).fetch_state == FetchState::Unavailable)
            }
            _ => {}
        }

        match &self.tree.node(id).kind {
            NodeKind::Mailbox(_) => self.mailbox_data(id, role),
            NodeKind::MessageList(_) => self.message_list_data(id, role),
            NodeKind::Message(_) => self.message_data(id, role),
            NodeKind::Part(_) => self.part_data(id, role),
        }
    }

    fn mailbox_data(&mut self, id: NodeId, role: Role) -> Value {
        let metadata = match self.tree.node(id).as_mailbox() {
            Some(mailbox) => mailbox.metadata.clone(),
            None => return Value::None,
        };
        let list = self.tree.message_list_of(id);

        match role {
            Role::MailboxName => Value::Str(metadata.mailbox.clone()),
            Role::ShortMailboxName => Value::Str(metadata.short_name().to_owned()),
            Role::MailboxSeparator => Value::Str(metadata.separator.clone()),
            Role::MailboxIsINBOX => Value::Bool(metadata.mailbox == "INBOX"),
            Role::MailboxIsSelectable => Value::Bool(metadata.is_selectable()),
            Role::MailboxIsSubscribed => Value::Bool(metadata.is_subscribed()),
            Role::MailboxHasChildMailboxes => {
                // cached LIST flags answer without any network I/O
                if let Some(answer) = metadata.has_children() {
                    return Value::Bool(answer);
                }
                if self.tree.node(id).fetch_state == FetchState::Done {
                    return Value::Bool(!self.tree.child_mailboxes(id).is_empty());
                }
                let cached = self.cache.child_mailboxes(&metadata.mailbox);
                if self.cache.child_mailboxes_fresh(&metadata.mailbox) {
                    return Value::Bool(!cached.is_empty());
                }
                self.ensure_children_listed(id);
                Value::None
            }
            Role::MailboxUidValidity => {
                match self.sync_states.get(&metadata.mailbox) {
                    Some(state) if state.has_uid_validity() => Value::U32(state.uid_validity()),
                    _ => Value::None,
                }
            }
            Role::MailboxNumbersFetched => {
                let numbers = match &self.tree.node(list).kind {
                    NodeKind::MessageList(numbers) => numbers.total.is_some(),
                    _ => false,
                };
                Value::Bool(numbers)
            }
            Role::TotalMessageCount | Role::UnreadMessageCount | Role::RecentMessageCount => {
                self.message_list_data(list, role)
            }
            _ => Value::None,
        }
    }

    fn message_list_data(&mut self, id: NodeId, role: Role) -> Value {
        let NodeKind::MessageList(list) = &self.tree.node(id).kind else {
            return Value::None;
        };
        match role {
            Role::TotalMessageCount => list.total.map_or(Value::None, Value::U32),
            Role::UnreadMessageCount => list.unread.map_or(Value::None, Value::U32),
            Role::RecentMessageCount => list.recent.map_or(Value::None, Value::U32),
            _ => Value::None,
        }
    }

    fn message_data(&mut self, id: NodeId, role: Role) -> Value {
        // flag roles work off whatever is known; payload roles trigger the
        // lazy metadata fetch
        let needs_payload = matches!(
            role,
            Role::MessageSubject
                | Role::MessageFrom
                | Role::MessageSender
                | Role::MessageReplyTo
                | Role::MessageTo
                | Role::MessageCc
                | Role::MessageBcc
                | Role::MessageMessageId
                | Role::MessageInReplyTo
                | Role::MessageDate
                | Role::MessageInternalDate
                | Role::MessageSize
                | Role::MessageFuzzyDate
                | Role::MessageHeaderReferences
                | Role::MessageHeaderListPost
                | Role::MessageHeaderListPostNo
                | Role::MessageEnvelope
        );
        if needs_payload && self.tree.node(id).fetch_state == FetchState::None {
            self.load_message_metadata(id);
        }

        let message = match self.tree.node(id).as_message() {
            Some(message) => message.clone(),
            None => return Value::None,
        };

        let flag_is_set = |store: &FlagStore, name: &str| {
            store
                .lookup(name)
                .is_some_and(|flag| message.flags.contains(flag))
        };

        match role {
            Role::MessageUid => Value::U32(message.uid),
            Role::MessageSubject => message
                .envelope
                .as_ref()
                .and_then(|e| e.subject.clone())
                .into(),
            Role::MessageFrom => message
                .envelope
                .as_ref()
                .map_or(Value::None, |e| Value::Addresses(e.from.clone())),
            Role::MessageSender => message
                .envelope
                .as_ref()
                .map_or(Value::None, |e| Value::Addresses(e.sender.clone())),
            Role::MessageReplyTo => message
                .envelope
                .as_ref()
                .map_or(Value::None, |e| Value::Addresses(e.reply_to.clone())),
            Role::MessageTo => message
                .envelope
                .as_ref()
                .map_or(Value::None, |e| Value::Addresses(e.to.clone())),
            Role::MessageCc => message
                .envelope
                .as_ref()
                .map_or(Value::None, |e| Value::Addresses(e.cc.clone())),
            Role::MessageBcc => message
                .envelope
                .as_ref()
                .map_or(Value::None, |e| Value::Addresses(e.bcc.clone())),
            Role::MessageMessageId => message
                .envelope
                .as_ref()
                .and_then(|e| e.message_id.clone())
                .into(),
            Role::MessageInReplyTo => message
                .envelope
                .as_ref()
                .map_or(Value::None, |e| Value::StrList(e.in_reply_to.clone())),
            Role::MessageDate => message
                .envelope
                .as_ref()
                .and_then(|e| e.date)
                .map_or(Value::None, Value::DateTime),
            Role::MessageInternalDate => message
                .internal_date
                .map_or(Value::None, Value::DateTime),
            Role::MessageSize => message.size.map_or(Value::None, Value::U32),
            Role::MessageIsMarkedRead => Value::Bool(flag_is_set(&self.flags, "\\Seen")),
            Role::MessageIsMarkedDeleted => Value::Bool(flag_is_set(&self.flags, "\\Deleted")),
            Role::MessageIsMarkedForwarded => Value::Bool(flag_is_set(&self.flags, "$Forwarded")),
            Role::MessageIsMarkedReplied => Value::Bool(flag_is_set(&self.flags, "\\Answered")),
            Role::MessageIsMarkedRecent => Value::Bool(flag_is_set(&self.flags, "\\Recent")),
            Role::MessageIsMarkedFlagged => Value::Bool(flag_is_set(&self.flags, "\\Flagged")),
            Role::MessageIsMarkedJunk => Value::Bool(flag_is_set(&self.flags, "$Junk")),
            Role::MessageIsMarkedNotJunk => Value::Bool(flag_is_set(&self.flags, "$NotJunk")),
            Role::MessageWasUnread => message.was_unread.map_or(Value::None, Value::Bool),
            Role::MessageFuzzyDate => {
                let date = message
                    .envelope
                    .as_ref()
                    .and_then(|e| e.date)
                    .or(message.internal_date);
                date.map_or(Value::None, |d| Value::Str(self.fuzzy_date(d)))
            }
            Role::MessageHeaderReferences => Value::StrList(message.headers.references.clone()),
            Role::MessageHeaderListPost => Value::StrList(message.headers.list_post.clone()),
            Role::MessageHeaderListPostNo => Value::Bool(message.headers.list_post_no),
            Role::MessageEnvelope => message
                .envelope
                .as_ref()
                .map_or(Value::None, |e| Value::Envelope(e.clone())),
            _ => Value::None,
        }
    }

    fn fuzzy_date(&self, date: DateTime<FixedOffset>) -> String {
        let Some(now) = self.now else {
            return date.format("%Y-%m-%d").to_string();
        };
        let days = (now.date_naive() - date.date_naive()).num_days();
        match days {
            0 => date.format("%H:%M").to_string(),
            1 => String::from("yesterday"),
            2..=6 => date.format("%A").to_string(),
            _ => date.format("%Y-%m-%d").to_string(),
        }
    }

    fn load_message_metadata(&mut self, id: NodeId) {
        let Some(mailbox) = self.mailbox_name_of(id) else {
            return;
        };
        let uid = self.tree.node(id).as_message().map_or(0, |m| m.uid);

        if uid != 0 {
            let bundle = self.cache.message_metadata(&mailbox, uid);
            if bundle.uid == uid && !bundle.serialized_body_structure.is_empty() {
                if let Some(structure) =
                    parts::deserialize_body_structure(&bundle.serialized_body_structure)
                {
                    {
                        let message = self
                            .tree
                            .node_mut(id)
                            .as_message_mut()
                            .expect("message node");
                        message.envelope = Some(bundle.envelope);
                        message.size = Some(bundle.size);
                        message.serialized_structure =
                            Some(bundle.serialized_body_structure.clone());
                    }
                    parts::build_part_tree(&mut self.tree, id, &structure);
                    self.tree.node_mut(id).fetch_state = FetchState::Done;
                    self.data_changed(id);
                    return;
                }
            }
        }

        self.tree.node_mut(id).fetch_state = FetchState::Loading;
        self.request(ModelRequest::FetchMessageMetadata(id));
    }

    fn part_data(&mut self, id: NodeId, role: Role) -> Value {
        let part = match self.tree.node(id).as_part() {
            Some(part) => part.clone(),
            None => return Value::None,
        };

        match role {
            Role::PartMimeType => Value::Str(part.mime_type.clone()),
            Role::PartCharset => part.charset.clone().into(),
            Role::PartContentFormat => part.content_format.clone().into(),
            Role::PartContentDelSp => part.content_delsp.clone().into(),
            Role::PartEncoding => Value::Str(part.transfer_encoding.clone()),
            Role::PartBodyFldId => part.body_fld_id.clone().into(),
            Role::PartBodyDisposition => part.body_disposition.clone().into(),
            Role::PartFileName => part.filename.clone().into(),
            Role::PartOctets => Value::U32(part.octets),
            Role::PartId => Value::Str(self.tree.part_id(id)),
            Role::PartPathToPart => Value::Str(self.tree.path_to_part(id)),
            Role::PartMultipartRelatedMainCid => part.multipart_related_main_cid.clone().into(),
            Role::PartIsTopLevelMultipart => Value::Bool(part.is_top_level_multipart),
            Role::PartBodyFldParam => Value::StrPairs(part.body_fld_param.clone()),
            Role::PartBufferPtr => part
                .data
                .clone()
                .map_or(Value::None, Value::Bytes),
            Role::PartData => {
                if part.is_top_level_multipart {
                    // no part id of its own; nothing fetchable here
                    return Value::Bytes(Vec::new());
                }
                if let Some(data) = part.data {
                    return Value::Bytes(data);
                }
                if self.tree.node(id).fetch_state == FetchState::None {
                    self.load_part(id, false);
                }
                match self.tree.node(id).as_part().and_then(|p| p.data.clone()) {
                    Some(data) => Value::Bytes(data),
                    None => Value::None,
                }
            }
            Role::PartForceFetchFromCache => {
                self.load_part(id, true);
                self.tree
                    .node(id)
                    .as_part()
                    .and_then(|p| p.data.clone())
                    .map_or(Value::None, Value::Bytes)
            }
            _ => Value::None,
        }
    }

    /// The cache key of a part node: its part id, with the `.X-RAW` twin
    /// for RAW pseudo-parts.
    pub fn part_cache_key(&self, id: NodeId) -> String {
        let raw = self
            .tree
            .node(id)
            .as_part()
            .is_some_and(|p| p.special == Some(SpecialKind::Raw));
        let part_id = self.tree.part_id(id);
        if raw {
            format!("{part_id}.X-RAW")
        } else {
            part_id
        }
    }

    /// Satisfy a part from the cache, or schedule a fetch.
    fn load_part(&mut self, id: NodeId, cache_only: bool) {
        let Some(message) = self.tree.message_of_part(id) else {
            return;
        };
        let Some(mailbox) = self.mailbox_name_of(id) else {
            return;
        };
        let uid = self.tree.node(message).as_message().map_or(0, |m| m.uid);

        if uid != 0 {
            let key = self.part_cache_key(id);
            if let Some(cached) = self.cache.message_part(&mailbox, uid, &key) {
                if let Some(part) = self.tree.node_mut(id).as_part_mut() {
                    part.data = Some(cached);
                }
                self.tree.node_mut(id).fetch_state = FetchState::Done;
                self.data_changed(id);
                return;
            }
        }

        if cache_only {
            return;
        }

        self.tree.node_mut(id).fetch_state = FetchState::Loading;
        self.request(ModelRequest::FetchPart(id));
    }

    // ----- LIST bookkeeping -----

    /// Merge one LIST response into a pending listing run.
    pub fn list_response_to_metadata(response: &ListResponse) -> MailboxMetadata {
        MailboxMetadata::new(
            response.mailbox.clone(),
            response
                .separator
                .map(|c| c.to_string())
                .unwrap_or_default(),
            response.flags.clone(),
        )
    }

    /// Install the final child-mailbox set for a mailbox and persist it.
    pub fn set_child_mailboxes(&mut self, mailbox: NodeId, metadata: Vec<MailboxMetadata>) {
        let name = self
            .tree
            .node(mailbox)
            .as_mailbox()
            .map(|m| m.metadata.mailbox.clone())
            .unwrap_or_default();

        let (removed, inserted) = self.tree.set_child_mailboxes(mailbox, &metadata);
        self.cache.set_child_mailboxes(&name, &metadata);
        self.tree.node_mut(mailbox).fetch_state = FetchState::Done;

        if removed > 0 {
            self.events.push(Event::RowsRemoved {
                parent: mailbox,
                first: 1,
                count: removed,
            });
        }
        if inserted > 0 {
            self.events.push(Event::RowsInserted {
                parent: mailbox,
                first: 1,
                count: inserted,
            });
        }
    }

    // ----- applying server state -----

    /// Recompute the cached totals of a message list.
    pub fn refresh_counts(&mut self, list: NodeId) {
        let children = self.tree.node(list).children.clone();
        let total = children.len() as u32;
        let mut unread = 0u32;
        let mut recent = 0u32;

        let seen = self.flags.lookup("\\Seen");
        let recent_flag = self.flags.lookup("\\Recent");

        for child in children {
            if let Some(message) = self.tree.node(child).as_message() {
                if !message.flags_fetched {
                    continue;
                }
                if seen.map_or(true, |flag| !message.flags.contains(flag)) {
                    unread += 1;
                }
                if recent_flag.is_some_and(|flag| message.flags.contains(flag)) {
                    recent += 1;
                }
            }
        }

        if let NodeKind::MessageList(numbers) = &mut self.tree.node_mut(list).kind {
            numbers.total = Some(total);
            numbers.unread = Some(unread);
            numbers.recent = Some(recent);
        }
        self.data_changed(list);
        if let Some(mailbox) = self.tree.node(list).parent {
            self.data_changed(mailbox);
        }
    }

    /// Apply one FETCH response to the message at its sequence number.
    ///
    /// Immutable metadata arriving before the message's UID is known is
    /// deferred until the UID shows up; flags are applied immediately
    /// against the sequence number.
    pub fn apply_fetch(&mut self, mailbox: NodeId, fetch: &FetchResponse) -> Result<(), Error> {
        let mailbox_name = self
            .tree
            .node(mailbox)
            .as_mailbox()
            .map(|m| m.metadata.mailbox.clone())
            .unwrap_or_default();
        let list = self.tree.message_list_of(mailbox);

        let offset = (fetch.seq as usize)
            .checked_sub(1)
            .ok_or(Error::UnknownMessageIndex {
                mailbox: mailbox_name.clone(),
                index: fetch.seq,
            })?;
        let message_id =
            self.tree
                .message_at(list, offset)
                .ok_or(Error::UnknownMessageIndex {
                    mailbox: mailbox_name.clone(),
                    index: fetch.seq,
                })?;

        // UID first: everything else depends on it
        if let Some(uid) = fetch.uid() {
            let known = self.tree.node(message_id).as_message().map_or(0, |m| m.uid);
            if known == 0 {
                if let Some(message) = self.tree.node_mut(message_id).as_message_mut() {
                    message.uid = uid;
                }
                self.data_changed(message_id);
                // replay anything that had to wait for the UID
                if let Some(items) = self.deferred.remove(&(mailbox_name.clone(), fetch.seq)) {
                    let replay = FetchResponse {
                        seq: fetch.seq,
                        items,
                    };
                    self.apply_fetch(mailbox, &replay)?;
                }
            } else if known != uid {
                return Err(Error::Mailbox {
                    mailbox: mailbox_name,
                    message: format!(
                        "UID of message #{} changed from {known} to {uid}",
                        fetch.seq
                    ),
                });
            }
        }

        let uid = self.tree.node(message_id).as_message().map_or(0, |m| m.uid);
        let mut counts_dirty = false;

        for item in &fetch.items {
            match item {
                FetchItem::Uid(_) => {}
                FetchItem::Flags(raw) => {
                    let set = self.flags.normalize(raw);
                    let rendered = self.flags.render(&set);
                    let seen = self.flags.lookup("\\Seen");
                    if let Some(message) = self.tree.node_mut(message_id).as_message_mut() {
                        let unread = seen.map_or(true, |flag| !set.contains(flag));
                        if message.was_unread.is_none() {
                            message.was_unread = Some(unread);
                        }
                        message.flags = set;
                        message.flags_fetched = true;
                    }
                    if uid != 0 {
                        self.cache.set_msg_flags(&mailbox_name, uid, &rendered);
                    }
                    counts_dirty = true;
                    self.data_changed(message_id);
                }
                FetchItem::ModSeq(_) => {
                    // per-message MODSEQ is not tracked; HIGHESTMODSEQ from
                    // the SELECT conversation is what the sync cares about
                }
                immutable => {
                    if uid == 0 {
                        log::debug!(
                            "{mailbox_name}: deferring {} for message #{} until its UID is known",
                            immutable.name(),
                            fetch.seq
                        );
                        self.deferred
                            .entry((mailbox_name.clone(), fetch.seq))
                            .or_default()
                            .push(immutable.clone());
                        continue;
                    }
                    self.apply_immutable_item(mailbox, message_id, &mailbox_name, uid, immutable)?;
                }
            }
        }

        if counts_dirty {
            self.refresh_counts(list);
        }

        Ok(())
    }

    fn apply_immutable_item(
        &mut self,
        _mailbox: NodeId,
        message_id: NodeId,
        mailbox_name: &str,
        uid: u32,
        item: &FetchItem,
    ) -> Result<(), Error> {
        match item {
            FetchItem::Envelope(envelope) => {
                if let Some(message) = self.tree.node_mut(message_id).as_message_mut() {
                    message.envelope = Some(envelope.clone());
                }
                self.cache.set_msg_envelope(mailbox_name, uid, envelope);
                self.mark_message_done_if_complete(message_id);
                self.data_changed(message_id);
            }
            FetchItem::InternalDate(date) => {
                if let Some(message) = self.tree.node_mut(message_id).as_message_mut() {
                    message.internal_date = Some(*date);
                }
                self.data_changed(message_id);
            }
            FetchItem::Rfc822Size(size) => {
                if let Some(message) = self.tree.node_mut(message_id).as_message_mut() {
                    message.size = Some(*size);
                }
                self.cache.set_msg_size(mailbox_name, uid, *size);
                self.data_changed(message_id);
            }
            FetchItem::BodyStructure(structure) => {
                let already = self
                    .tree
                    .node(message_id)
                    .as_message()
                    .is_some_and(|m| m.serialized_structure.is_some());
                if !already {
                    let serialized = parts::serialize_body_structure(structure);
                    if let Some(message) = self.tree.node_mut(message_id).as_message_mut() {
                        message.serialized_structure = Some(serialized.clone());
                    }
                    parts::build_part_tree(&mut self.tree, message_id, structure);
                    self.cache
                        .set_msg_structure(mailbox_name, uid, &serialized);
                    let count = self.tree.node(message_id).children.len();
                    self.events.push(Event::RowsInserted {
                        parent: message_id,
                        first: 0,
                        count,
                    });
                }
                self.mark_message_done_if_complete(message_id);
                self.data_changed(message_id);
            }
            FetchItem::Section(section) => {
                self.apply_section(message_id, mailbox_name, uid, section)?;
            }
            FetchItem::Other { name, .. } => {
                log::debug!("{mailbox_name}: ignoring unrecognized FETCH item {name}");
            }
            FetchItem::Uid(_) | FetchItem::Flags(_) | FetchItem::ModSeq(_) => {}
        }
        Ok(())
    }

    fn mark_message_done_if_complete(&mut self, message_id: NodeId) {
        let complete = self
            .tree
            .node(message_id)
            .as_message()
            .is_some_and(|m| m.envelope.is_some() && m.serialized_structure.is_some());
        if complete {
            self.tree.node_mut(message_id).fetch_state = FetchState::Done;
        }
    }

    fn apply_section(
        &mut self,
        message_id: NodeId,
        mailbox_name: &str,
        uid: u32,
        section: &mainsail_proto::fetch::SectionData,
    ) -> Result<(), Error> {
        let data = section.data.clone().unwrap_or_default();

        // header-field subsets feed the threading/list headers
        if section.section.starts_with("HEADER.FIELDS") {
            let parsed = rfc5322::parse_header_fields(&data);
            if let Some(message) = self.tree.node_mut(message_id).as_message_mut() {
                message.headers = parsed;
            }
            self.data_changed(message_id);
            return Ok(());
        }

        let Some(target) = parts::part_by_section(&self.tree, message_id, &section.section)
        else {
            return Err(Error::UnknownMessageIndex {
                mailbox: mailbox_name.to_owned(),
                index: 0,
            });
        };

        if self.tree.node(target).as_part().is_none() {
            // BODY[] of the whole message; nobody asks for that here
            log::debug!("{mailbox_name}: ignoring whole-message section data");
            return Ok(());
        }

        if section.binary {
            // the server already decoded; store verbatim
            self.store_part_data(target, mailbox_name, uid, data, None);
            return Ok(());
        }

        // BODY[...]: transfer-encoded bytes. If the RAW twin is waiting,
        // it gets the undecoded copy under <id>.X-RAW.
        let raw_twin = parts::special_of(&self.tree, target, SpecialKind::Raw);
        let raw_loading = raw_twin
            .is_some_and(|raw| self.tree.node(raw).fetch_state == FetchState::Loading);

        let part_id = self.tree.part_id(target);

        if raw_loading {
            let raw = raw_twin.expect("checked above");
            self.cache.forget_msg_part(mailbox_name, uid, &part_id);
            self.cache
                .set_msg_part(mailbox_name, uid, &format!("{part_id}.X-RAW"), &data);
            if let Some(part) = self.tree.node_mut(raw).as_part_mut() {
                part.data = Some(data.clone());
            }
            self.tree.node_mut(raw).fetch_state = FetchState::Done;
            self.data_changed(raw);
        }

        let target_wants_data = self.tree.node(target).fetch_state == FetchState::Loading
            || self.tree.node(target).fetch_state == FetchState::None;
        if target_wants_data {
            let is_pseudo = self
                .tree
                .node(target)
                .as_part()
                .is_some_and(|p| p.special.is_some());
            let decoded = if is_pseudo {
                // HEADER/TEXT/MIME pseudo-parts are not transfer-encoded
                data
            } else {
                let encoding = self
                    .tree
                    .node(target)
                    .as_part()
                    .map(|p| p.transfer_encoding.clone())
                    .unwrap_or_default();
                self.decoder.decode(&data, &encoding)
            };
            let raw_cached = self
                .cache
                .message_part(mailbox_name, uid, &format!("{part_id}.X-RAW"))
                .is_some();
            self.store_part_data(
                target,
                mailbox_name,
                uid,
                decoded,
                if raw_cached { Some(false) } else { None },
            );
        }

        Ok(())
    }

    fn store_part_data(
        &mut self,
        target: NodeId,
        mailbox_name: &str,
        uid: u32,
        data: Vec<u8>,
        cache_write: Option<bool>,
    ) {
        let key = self.part_cache_key(target);
        if cache_write.unwrap_or(true) {
            self.cache.set_msg_part(mailbox_name, uid, &key, &data);
        }
        if let Some(part) = self.tree.node_mut(target).as_part_mut() {
            part.data = Some(data);
        }
        self.tree.node_mut(target).fetch_state = FetchState::Done;
        self.data_changed(target);
    }

    /// Apply `* n EXPUNGE`: remove the message, renumber, and (normally)
    /// drop its cached per-message data.
    ///
    /// `drop_cache` is false while a sync's UID SEARCH is in flight: the
    /// stale in-memory numbering may point the removal at the wrong UID,
    /// and the post-search diff is the authority on what leaves the cache.
    pub fn apply_expunge(
        &mut self,
        mailbox: NodeId,
        seq: u32,
        drop_cache: bool,
    ) -> Result<u32, Error> {
        let mailbox_name = self
            .tree
            .node(mailbox)
            .as_mailbox()
            .map(|m| m.metadata.mailbox.clone())
            .unwrap_or_default();
        let list = self.tree.message_list_of(mailbox);

        let offset = (seq as usize).saturating_sub(1);
        let Some(uid) = self.tree.expunge(list, seq) else {
            return Err(Error::Mailbox {
                mailbox: mailbox_name,
                message: format!("EXPUNGE for out-of-range sequence number {seq}"),
            });
        };

        self.deferred.remove(&(mailbox_name.clone(), seq));
        if drop_cache && uid != 0 {
            self.cache.clear_message(&mailbox_name, uid);
        }
        self.events.push(Event::RowsRemoved {
            parent: list,
            first: offset,
            count: 1,
        });
        self.refresh_counts(list);

        Ok(uid)
    }

    /// Apply a VANISHED set. `(EARLIER)` sets go quietly: unknown UIDs are
    /// fine there.
    pub fn apply_vanished(&mut self, mailbox: NodeId, uids: &[u32], earlier: bool) -> usize {
        let mailbox_name = self
            .tree
            .node(mailbox)
            .as_mailbox()
            .map(|m| m.metadata.mailbox.clone())
            .unwrap_or_default();
        let list = self.tree.message_list_of(mailbox);
        let mut removed = 0usize;

        for &uid in uids {
            match self.tree.find_uid(list, uid) {
                Ok(offset) => {
                    let victim = self
                        .tree
                        .message_at(list, offset)
                        .expect("find_uid returned a live offset");
                    self.tree.remove_subtree(victim);
                    self.cache.clear_message(&mailbox_name, uid);
                    self.events.push(Event::RowsRemoved {
                        parent: list,
                        first: offset,
                        count: 1,
                    });
                    removed += 1;
                }
                Err(_) => {
                    if !earlier {
                        log::warn!(
                            "{mailbox_name}: VANISHED for unknown UID {uid}"
                        );
                    }
                    self.cache.clear_message(&mailbox_name, uid);
                }
            }
        }

        if removed > 0 {
            self.refresh_counts(list);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use mainsail_proto::fetch::{FetchItem, FetchResponse};

    use crate::cache::MemoryCache;

    use super::*;

    fn model_with_messages(count: usize) -> (Model, NodeId) {
        let mut model = Model::new(Box::new(MemoryCache::new()), Config::default());
        let root = model.tree.root();
        let inbox = model
            .tree
            .create_mailbox(root, MailboxMetadata::new("INBOX", "/", vec![]));
        let list = model.tree.message_list_of(inbox);
        model.tree.append_placeholder_messages(list, count);
        (model, inbox)
    }

    fn fetch(seq: u32, items: Vec<FetchItem>) -> FetchResponse {
        FetchResponse { seq, items }
    }

    #[test]
    fn test_uid_never_changes_within_an_epoch() {
        let (mut model, inbox) = model_with_messages(1);

        model
            .apply_fetch(inbox, &fetch(1, vec![FetchItem::Uid(42)]))
            .unwrap();
        // same UID again is fine
        model
            .apply_fetch(inbox, &fetch(1, vec![FetchItem::Uid(42)]))
            .unwrap();
        // a different one is a broken mailbox
        let err = model
            .apply_fetch(inbox, &fetch(1, vec![FetchItem::Uid(43)]))
            .unwrap_err();
        assert!(matches!(err, Error::Mailbox { .. }));
    }

    #[test]
    fn test_fetch_out_of_range_is_unknown_index() {
        let (mut model, inbox) = model_with_messages(1);
        let err = model
            .apply_fetch(inbox, &fetch(5, vec![FetchItem::Uid(42)]))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownMessageIndex { index: 5, .. }));
    }

    #[test]
    fn test_immutable_metadata_waits_for_the_uid() {
        let (mut model, inbox) = model_with_messages(1);

        // size arrives while the UID is still unknown: deferred, and the
        // cache knows nothing yet
        model
            .apply_fetch(inbox, &fetch(1, vec![FetchItem::Rfc822Size(1234)]))
            .unwrap();
        let list = model.tree.message_list_of(inbox);
        let message = model.tree.message_at(list, 0).unwrap();
        assert_eq!(model.tree.node(message).as_message().unwrap().size, None);

        // the UID shows up: the deferred item is replayed
        model
            .apply_fetch(inbox, &fetch(1, vec![FetchItem::Uid(7)]))
            .unwrap();
        assert_eq!(
            model.tree.node(message).as_message().unwrap().size,
            Some(1234)
        );
        assert_eq!(model.cache.message_metadata("INBOX", 7).size, 1234);
    }

    #[test]
    fn test_flags_apply_by_sequence_even_without_uid() {
        let (mut model, inbox) = model_with_messages(2);

        model
            .apply_fetch(
                inbox,
                &fetch(2, vec![FetchItem::Flags(vec!["\\Seen".into()])]),
            )
            .unwrap();

        let list = model.tree.message_list_of(inbox);
        let message = model.tree.message_at(list, 1).unwrap();
        let node = model.tree.node(message).as_message().unwrap().clone();
        assert!(node.flags_fetched);
        assert_eq!(node.was_unread, Some(false));

        // unread/total counters follow the flags that are known
        if let NodeKind::MessageList(numbers) = &model.tree.node(list).kind {
            assert_eq!(numbers.total, Some(2));
            assert_eq!(numbers.unread, Some(0));
        } else {
            panic!("not a message list");
        }
    }

    #[test]
    fn test_commit_writes_state_and_map_together() {
        let (mut model, inbox) = model_with_messages(2);
        let list = model.tree.message_list_of(inbox);
        for (offset, uid) in [(0usize, 4u32), (1, 9)] {
            let id = model.tree.message_at(list, offset).unwrap();
            model.tree.node_mut(id).as_message_mut().unwrap().uid = uid;
        }
        model.sync_state_mut("INBOX").set_exists(2);
        model.sync_state_mut("INBOX").set_uid_next(10);
        model.sync_state_mut("INBOX").set_uid_validity(1);

        model.commit_sync_state(inbox);

        let state = model.cache.mailbox_sync_state("INBOX");
        let map = model.cache.uid_mapping("INBOX");
        assert_eq!(state.exists() as usize, map.len());
        assert_eq!(map, vec![4, 9]);
    }

    #[test]
    fn test_vanished_earlier_is_quiet_about_unknown_uids() {
        let (mut model, inbox) = model_with_messages(2);
        let list = model.tree.message_list_of(inbox);
        for (offset, uid) in [(0usize, 4u32), (1, 9)] {
            let id = model.tree.message_at(list, offset).unwrap();
            model.tree.node_mut(id).as_message_mut().unwrap().uid = uid;
        }

        let removed = model.apply_vanished(inbox, &[9, 1000], true);
        assert_eq!(removed, 1);
        assert_eq!(model.tree.uid_map(list), vec![4]);
    }
}
