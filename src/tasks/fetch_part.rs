//! Fetching part payloads, batched across the delayed-fetch window.

use mainsail_proto::{
    command::{CommandBody, FetchAttr},
    response::{Response, SocketEvent, State, StateKind},
    sequence::SequenceSet,
};

use crate::{
    config::PartFetchingMode,
    error::Error,
    model::{
        tree::{FetchState, NodeId, SpecialKind},
        Model,
    },
    tasks::{Claim, Outgoing, Task, TaskOutcome},
};

/// One `UID FETCH` per message, all sections of that message combined.
pub struct FetchMsgPartTask {
    mailbox_name: String,
    parts: Vec<NodeId>,
    tags: Vec<String>,
    outcome: TaskOutcome,
    aborted: bool,
}

impl FetchMsgPartTask {
    pub fn new(model: &Model, parts: Vec<NodeId>) -> Self {
        let mailbox_name = parts
            .first()
            .and_then(|&id| {
                model.tree.owning_mailbox(id).and_then(|m| {
                    model
                        .tree
                        .node(m)
                        .as_mailbox()
                        .map(|x| x.metadata.mailbox.clone())
                })
            })
            .unwrap_or_default();
        Self {
            mailbox_name,
            parts,
            tags: Vec::new(),
            outcome: TaskOutcome::Running,
            aborted: false,
        }
    }

    /// The fetch item for one part node: `BODY.PEEK[...]`, or
    /// `BINARY.PEEK[...]` when configured and the server can.
    fn attr_for(model: &Model, id: NodeId) -> Option<FetchAttr> {
        let part = model.tree.get(id)?.as_part()?;
        let section = match model.part_cache_key(id) {
            key if key.ends_with(".X-RAW") => key[..key.len() - ".X-RAW".len()].to_owned(),
            key => key,
        };

        // RAW wants the transfer-encoded original: always plain BODY
        if part.special == Some(SpecialKind::Raw) {
            return Some(FetchAttr::BodyPeek(section));
        }

        let binary = model.config.part_fetching_mode == PartFetchingMode::Binary
            && model.has_capability("BINARY")
            && part.special.is_none();
        if binary {
            Some(FetchAttr::BinaryPeek(section))
        } else {
            Some(FetchAttr::BodyPeek(section))
        }
    }
}

impl Task for FetchMsgPartTask {
    fn name(&self) -> &'static str {
        "fetch-message-part"
    }

    fn required_mailbox(&self) -> Option<&str> {
        Some(&self.mailbox_name)
    }

    fn activate(&mut self, model: &mut Model, out: &mut Outgoing) {
        // group the wanted sections by their message's UID
        let mut per_message: Vec<(u32, Vec<FetchAttr>)> = Vec::new();
        for &id in &self.parts {
            let Some(message) = model.tree.message_of_part(id) else {
                continue;
            };
            let uid = model.tree.node(message).as_message().map_or(0, |m| m.uid);
            if uid == 0 {
                log::warn!(
                    "{}: cannot fetch a part of a message with unknown UID",
                    self.mailbox_name
                );
                continue;
            }
            let Some(attr) = Self::attr_for(model, id) else {
                continue;
            };
            match per_message.iter_mut().find(|(u, _)| *u == uid) {
                Some((_, attrs)) => {
                    if !attrs.contains(&attr) {
                        attrs.push(attr);
                    }
                }
                None => per_message.push((uid, vec![attr])),
            }
        }

        if per_message.is_empty() {
            self.outcome = TaskOutcome::Failed(Error::UnknownMessageIndex {
                mailbox: self.mailbox_name.clone(),
                index: 0,
            });
            return;
        }

        for (uid, items) in per_message {
            self.tags.push(out.emit(CommandBody::Fetch {
                uid: true,
                sequence: SequenceSet::single(uid),
                items,
            }));
        }
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        match response {
            Response::Socket(SocketEvent::Disconnected { reason }) => {
                self.outcome = TaskOutcome::Failed(Error::Disconnected(reason.clone()));
                Claim::Claimed
            }
            Response::State(State {
                tag: Some(tag),
                kind,
                text,
                ..
            }) if self.tags.iter().any(|mine| mine == tag) => {
                self.tags.retain(|mine| mine != tag);
                if *kind != StateKind::Ok {
                    for &id in &self.parts {
                        if model
                            .tree
                            .get(id)
                            .is_some_and(|n| n.fetch_state == FetchState::Loading)
                        {
                            model.tree.node_mut(id).fetch_state = FetchState::Unavailable;
                        }
                    }
                    self.outcome = TaskOutcome::Failed(Error::Server {
                        kind: *kind,
                        text: text.clone(),
                    });
                    return Claim::Claimed;
                }

                if self.tags.is_empty() {
                    // a part the server never answered for stays visibly
                    // unavailable rather than loading forever
                    for &id in &self.parts {
                        if model
                            .tree
                            .get(id)
                            .is_some_and(|n| n.fetch_state == FetchState::Loading)
                        {
                            model.tree.node_mut(id).fetch_state = FetchState::Unavailable;
                            model.push_error(
                                id,
                                "Part not available",
                                String::from("the server did not return this part"),
                            );
                        }
                    }
                    self.outcome = if self.aborted {
                        TaskOutcome::Failed(Error::Aborted(String::from("fetch cancelled")))
                    } else {
                        TaskOutcome::Done
                    };
                }
                Claim::Claimed
            }
            _ => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.aborted = true;
    }

    fn target_node(&self) -> Option<NodeId> {
        self.parts.first().copied()
    }
}
