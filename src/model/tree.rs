//! The mailbox/message/part tree.
//!
//! Nodes live in an arena and reference each other through stable
//! [`NodeId`] handles; there are no owning back-pointers. A handle stays
//! valid across structural reshuffles (expunges renumber rows, not
//! handles) and dies only when its node is deleted.
//!
//! Structural invariant: child slot zero of every Mailbox node is its
//! MessageList; the remaining children are child Mailboxes.

use chrono::{DateTime, FixedOffset};
use mainsail_proto::{envelope::Envelope, rfc5322::HeaderFields};

use crate::model::{flags::FlagSet, metadata::MailboxMetadata};

/// Stable handle to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// How much of a node's payload has been loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
    #[default]
    None,
    Loading,
    Done,
    Unavailable,
}

/// A mailbox (folder).
#[derive(Debug, Clone, Default)]
pub struct MailboxNode {
    pub metadata: MailboxMetadata,
}

/// The container of a mailbox's messages; always child slot zero.
#[derive(Debug, Clone, Default)]
pub struct MessageListNode {
    pub total: Option<u32>,
    pub unread: Option<u32>,
    pub recent: Option<u32>,
}

/// One message.
#[derive(Debug, Clone, Default)]
pub struct MessageNode {
    /// 0 while unknown; once non-zero it never changes within a
    /// UIDVALIDITY epoch.
    pub uid: u32,
    pub flags: FlagSet,
    pub flags_fetched: bool,
    /// Sticky "was unread when the list was first shown" bit.
    pub was_unread: Option<bool>,
    pub envelope: Option<Envelope>,
    pub internal_date: Option<DateTime<FixedOffset>>,
    pub size: Option<u32>,
    /// References / List-Post from `BODY[HEADER.FIELDS (...)]`.
    pub headers: HeaderFields,
    /// Serialized BODYSTRUCTURE, kept for the cache.
    pub serialized_structure: Option<Vec<u8>>,
    /// HEADER/TEXT pseudo-parts of the whole message; columns, not rows.
    pub specials: Vec<NodeId>,
}

/// The four pseudo-part columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    Header,
    Text,
    Mime,
    /// The un-decoded transfer-encoded twin; cached as `<id>.X-RAW`.
    Raw,
}

/// One MIME part (or pseudo-part).
#[derive(Debug, Clone, Default)]
pub struct PartNode {
    /// `type/subtype`, lowercased. For a special column, the parent's.
    pub mime_type: String,
    pub charset: Option<String>,
    pub content_format: Option<String>,
    pub content_delsp: Option<String>,
    pub transfer_encoding: String,
    pub body_fld_id: Option<String>,
    pub body_disposition: Option<String>,
    /// RFC 2231-decoded filename from disposition or Content-Type.
    pub filename: Option<String>,
    pub octets: u32,
    pub body_fld_param: Vec<(String, String)>,
    /// `start` parameter of a multipart/related.
    pub multipart_related_main_cid: Option<String>,
    /// Multipart sitting directly inside a message: no part id, not
    /// fetchable.
    pub is_top_level_multipart: bool,
    /// Set on pseudo-parts; `None` for real MIME parts.
    pub special: Option<SpecialKind>,
    /// The (decoded, except for RAW) payload bytes.
    pub data: Option<Vec<u8>>,
    /// Special-column children, in [`SpecialKind`] order where present.
    pub specials: Vec<NodeId>,
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Mailbox(MailboxNode),
    MessageList(MessageListNode),
    Message(MessageNode),
    Part(PartNode),
}

/// One arena slot.
#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub fetch_state: FetchState,
    pub kind: NodeKind,
}

impl Node {
    pub fn as_mailbox(&self) -> Option<&MailboxNode> {
        match &self.kind {
            NodeKind::Mailbox(mailbox) => Some(mailbox),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageNode> {
        match &self.kind {
            NodeKind::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut MessageNode> {
        match &mut self.kind {
            NodeKind::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_part(&self) -> Option<&PartNode> {
        match &self.kind {
            NodeKind::Part(part) => Some(part),
            _ => None,
        }
    }

    pub fn as_part_mut(&mut self) -> Option<&mut PartNode> {
        match &mut self.kind {
            NodeKind::Part(part) => Some(part),
            _ => None,
        }
    }
}

/// The arena.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    free: Vec<u32>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A tree with the invisible root mailbox (and its message list).
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
        };
        let root = tree.alloc(None, NodeKind::Mailbox(MailboxNode::default()));
        tree.root = root;
        let list = tree.alloc(
            Some(root),
            NodeKind::MessageList(MessageListNode::default()),
        );
        tree.node_mut(root).children.push(list);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let node = Node {
            parent,
            children: Vec::new(),
            fetch_state: FetchState::None,
            kind,
        };
        if let Some(index) = self.free.pop() {
            self.nodes[index as usize] = Some(node);
            NodeId(index)
        } else {
            self.nodes.push(Some(node));
            NodeId(u32::try_from(self.nodes.len() - 1).expect("node count fits u32"))
        }
    }

    /// Panics on a dangling handle; use [`Tree::get`] when unsure.
    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0 as usize]
            .as_ref()
            .expect("valid node handle")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0 as usize]
            .as_mut()
            .expect("valid node handle")
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Row of a node under its parent (special columns have no row).
    pub fn row_of(&self, id: NodeId) -> Option<usize> {
        let parent = self.node(id).parent?;
        self.node(parent).children.iter().position(|&c| c == id)
    }

    // ----- mailbox hierarchy -----

    /// The MessageList of a mailbox (child slot zero).
    pub fn message_list_of(&self, mailbox: NodeId) -> NodeId {
        debug_assert!(matches!(self.node(mailbox).kind, NodeKind::Mailbox(_)));
        self.node(mailbox).children[0]
    }

    /// Child mailboxes (children minus slot zero).
    pub fn child_mailboxes(&self, mailbox: NodeId) -> &[NodeId] {
        &self.node(mailbox).children[1..]
    }

    pub fn create_mailbox(&mut self, parent: NodeId, metadata: MailboxMetadata) -> NodeId {
        let id = self.alloc(Some(parent), NodeKind::Mailbox(MailboxNode { metadata }));
        let list = self.alloc(Some(id), NodeKind::MessageList(MessageListNode::default()));
        self.node_mut(id).children.push(list);
        self.node_mut(parent).children.push(id);
        id
    }

    /// Replace the child-mailbox set of `parent` with `metadata`, keeping
    /// nodes (and their subtrees) whose name survives. Slot zero is
    /// preserved. Returns (removed, inserted) counts.
    pub fn set_child_mailboxes(
        &mut self,
        parent: NodeId,
        metadata: &[MailboxMetadata],
    ) -> (usize, usize) {
        let old: Vec<NodeId> = self.child_mailboxes(parent).to_vec();

        let mut kept: Vec<Option<NodeId>> = vec![None; metadata.len()];
        let mut removed = 0usize;

        for id in old {
            let name = self
                .node(id)
                .as_mailbox()
                .map(|m| m.metadata.mailbox.clone())
                .unwrap_or_default();
            match metadata.iter().position(|m| m.mailbox == name) {
                Some(slot) => {
                    // refresh flags/separator in place
                    if let NodeKind::Mailbox(mailbox) = &mut self.node_mut(id).kind {
                        mailbox.metadata = metadata[slot].clone();
                    }
                    kept[slot] = Some(id);
                }
                None => {
                    self.remove_subtree(id);
                    removed += 1;
                }
            }
        }

        let mut inserted = 0usize;
        let mut new_children = vec![self.node(parent).children[0]];
        for (slot, meta) in metadata.iter().enumerate() {
            let id = match kept[slot] {
                Some(id) => id,
                None => {
                    inserted += 1;
                    let id = self.alloc(
                        Some(parent),
                        NodeKind::Mailbox(MailboxNode {
                            metadata: meta.clone(),
                        }),
                    );
                    let list =
                        self.alloc(Some(id), NodeKind::MessageList(MessageListNode::default()));
                    self.node_mut(id).children.push(list);
                    id
                }
            };
            new_children.push(id);
        }
        self.node_mut(parent).children = new_children;
        self.node_mut(parent).fetch_state = FetchState::Done;

        (removed, inserted)
    }

    /// Depth-first search for a mailbox by full name.
    pub fn find_mailbox(&self, name: &str) -> Option<NodeId> {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Some(mailbox) = self.node(id).as_mailbox() {
                if id != self.root && mailbox.metadata.mailbox == name {
                    return Some(id);
                }
                stack.extend(self.child_mailboxes(id));
            }
        }
        None
    }

    /// The mailbox that ultimately contains this node.
    pub fn owning_mailbox(&self, mut id: NodeId) -> Option<NodeId> {
        loop {
            let node = self.get(id)?;
            if matches!(node.kind, NodeKind::Mailbox(_)) {
                return Some(id);
            }
            id = node.parent?;
        }
    }

    // ----- messages -----

    /// Append `count` placeholder messages (UID 0) at the end of the list.
    pub fn append_placeholder_messages(&mut self, list: NodeId, count: usize) -> usize {
        let first = self.node(list).children.len();
        for _ in 0..count {
            let message = self.alloc(Some(list), NodeKind::Message(MessageNode::default()));
            self.node_mut(list).children.push(message);
        }
        first
    }

    /// Remove every message (full resync).
    pub fn clear_messages(&mut self, list: NodeId) -> usize {
        let children = std::mem::take(&mut self.node_mut(list).children);
        let count = children.len();
        for child in children {
            self.remove_subtree(child);
        }
        count
    }

    /// Message node at a 0-based offset.
    pub fn message_at(&self, list: NodeId, offset: usize) -> Option<NodeId> {
        self.node(list).children.get(offset).copied()
    }

    /// The UID map as currently known, one entry per message, 0 for
    /// unknown.
    pub fn uid_map(&self, list: NodeId) -> Vec<u32> {
        self.node(list)
            .children
            .iter()
            .map(|&child| self.node(child).as_message().map_or(0, |m| m.uid))
            .collect()
    }

    /// Apply `* n EXPUNGE` (1-based sequence number). Returns the removed
    /// node's UID.
    pub fn expunge(&mut self, list: NodeId, seq: u32) -> Option<u32> {
        let offset = seq.checked_sub(1)? as usize;
        let children = &self.node(list).children;
        if offset >= children.len() {
            return None;
        }
        let victim = children[offset];
        let uid = self.node(victim).as_message().map_or(0, |m| m.uid);
        self.node_mut(list).children.remove(offset);
        self.remove_subtree(victim);
        Some(uid)
    }

    /// Locate a UID in the message list, tolerating unknown (UID 0) slots.
    /// Returns `Ok(offset)` when found, `Err(insert_offset)` otherwise.
    pub fn find_uid(&self, list: NodeId, uid: u32) -> Result<usize, usize> {
        let map = self.uid_map(list);
        let offset = crate::find::lower_bound_with_unknown(
            &map,
            &uid,
            |&candidate| candidate == 0,
            |&a, &b| a < b,
        );
        if map.get(offset) == Some(&uid) {
            Ok(offset)
        } else {
            Err(offset)
        }
    }

    /// Drop a whole subtree, freeing every node in it and detaching it
    /// from its parent.
    pub fn remove_subtree(&mut self, id: NodeId) {
        if let Some(parent) = self.get(id).and_then(|node| node.parent) {
            self.node_mut(parent).children.retain(|&c| c != id);
            if let NodeKind::Part(part) = &mut self.node_mut(parent).kind {
                part.specials.retain(|&c| c != id);
            }
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes[current.0 as usize].take() {
                stack.extend(node.children);
                match node.kind {
                    NodeKind::Part(part) => stack.extend(part.specials),
                    NodeKind::Message(message) => stack.extend(message.specials),
                    _ => {}
                }
                self.free.push(current.0);
            }
        }
    }

    // ----- parts -----

    pub fn create_part(&mut self, parent: NodeId, part: PartNode) -> NodeId {
        let id = self.alloc(Some(parent), NodeKind::Part(part));
        self.node_mut(parent).children.push(id);
        id
    }

    /// Create a pseudo-part attached as a special column, not as a row.
    pub fn create_special_part(&mut self, parent: NodeId, part: PartNode) -> NodeId {
        let id = self.alloc(Some(parent), NodeKind::Part(part));
        match &mut self.node_mut(parent).kind {
            NodeKind::Part(parent_part) => parent_part.specials.push(id),
            NodeKind::Message(message) => message.specials.push(id),
            _ => unreachable!("specials only hang off parts and messages"),
        }
        id
    }

    /// The IMAP part id of a part node: dotted child positions, with
    /// top-level multiparts contributing nothing.
    pub fn part_id(&self, id: NodeId) -> String {
        let node = self.node(id);
        let Some(part) = node.as_part() else {
            return String::new();
        };

        if let Some(special) = part.special {
            let parent = node.parent.expect("special part has a parent");
            let prefix = self.part_id(parent);
            let suffix = match special {
                SpecialKind::Header => "HEADER",
                SpecialKind::Text => "TEXT",
                SpecialKind::Mime => "MIME",
                SpecialKind::Raw => {
                    // RAW is addressed by the parent's own id
                    return prefix;
                }
            };
            return if prefix.is_empty() {
                suffix.to_string()
            } else {
                format!("{prefix}.{suffix}")
            };
        }

        if part.is_top_level_multipart {
            return String::new();
        }

        let parent = node.parent.expect("part has a parent");
        let row = self
            .row_of(id)
            .expect("real parts are rows under their parent");
        let number = row + 1;

        match &self.node(parent).kind {
            NodeKind::Message(_) => number.to_string(),
            NodeKind::Part(parent_part) => {
                if parent_part.is_top_level_multipart {
                    let grandparent = self.node(parent).parent.expect("part parent");
                    match &self.node(grandparent).kind {
                        // grandparent message/rfc822 part carries the id
                        NodeKind::Part(_) => {
                            let parent_id = self.part_id(grandparent);
                            format!("{parent_id}.{number}")
                        }
                        // grandparent is the message itself
                        _ => number.to_string(),
                    }
                } else {
                    let parent_id = self.part_id(parent);
                    format!("{parent_id}.{number}")
                }
            }
            _ => number.to_string(),
        }
    }

    /// Slash-separated row path of a part within its message, e.g. `/0/1`.
    pub fn path_to_part(&self, id: NodeId) -> String {
        let node = self.node(id);
        let Some(parent) = node.parent else {
            return String::new();
        };
        let row = self.row_of(id).unwrap_or(0);
        match &self.node(parent).kind {
            NodeKind::Part(_) => format!("{}/{}", self.path_to_part(parent), row),
            _ => format!("/{row}"),
        }
    }

    /// A human-readable path for error events.
    pub fn describe(&self, id: NodeId) -> String {
        let Some(node) = self.get(id) else {
            return String::from("<gone>");
        };
        match &node.kind {
            NodeKind::Mailbox(mailbox) => mailbox.metadata.mailbox.clone(),
            NodeKind::MessageList(_) => {
                let parent = node.parent.map(|p| self.describe(p)).unwrap_or_default();
                format!("{parent}/<messages>")
            }
            NodeKind::Message(message) => {
                let parent = self
                    .owning_mailbox(id)
                    .map(|p| self.describe(p))
                    .unwrap_or_default();
                format!("{parent}/uid-{}", message.uid)
            }
            NodeKind::Part(_) => {
                let mailbox = self
                    .owning_mailbox(id)
                    .map(|p| self.describe(p))
                    .unwrap_or_default();
                format!("{mailbox}/part-{}", self.part_id(id))
            }
        }
    }

    /// The message a part belongs to.
    pub fn message_of_part(&self, mut id: NodeId) -> Option<NodeId> {
        loop {
            let node = self.get(id)?;
            match node.kind {
                NodeKind::Message(_) => return Some(id),
                _ => id = node.parent?,
            }
        }
    }
}
