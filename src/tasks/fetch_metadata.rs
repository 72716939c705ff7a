//! Fetching a message's lazily materialized payload: envelope, dates,
//! size, BODYSTRUCTURE, and the threading/list header fields.

use mainsail_proto::{
    command::{CommandBody, FetchAttr},
    response::{Response, SocketEvent, State, StateKind},
    sequence::SequenceSet,
};

use crate::{
    error::Error,
    model::{
        tree::{FetchState, NodeId},
        Model,
    },
    tasks::{Claim, Outgoing, Task, TaskOutcome},
};

pub struct FetchMsgMetadataTask {
    mailbox_name: String,
    messages: Vec<NodeId>,
    tag: Option<String>,
    outcome: TaskOutcome,
    aborted: bool,
}

impl FetchMsgMetadataTask {
    pub fn new(model: &Model, messages: Vec<NodeId>) -> Self {
        let mailbox_name = messages
            .first()
            .and_then(|&id| {
                model
                    .tree
                    .owning_mailbox(id)
                    .and_then(|m| model.tree.node(m).as_mailbox().map(|x| x.metadata.mailbox.clone()))
            })
            .unwrap_or_default();
        Self {
            mailbox_name,
            messages,
            tag: None,
            outcome: TaskOutcome::Running,
            aborted: false,
        }
    }
}

impl Task for FetchMsgMetadataTask {
    fn name(&self) -> &'static str {
        "fetch-message-metadata"
    }

    fn required_mailbox(&self) -> Option<&str> {
        Some(&self.mailbox_name)
    }

    fn activate(&mut self, model: &mut Model, out: &mut Outgoing) {
        let mut uids: Vec<u32> = self
            .messages
            .iter()
            .filter_map(|&id| model.tree.get(id).and_then(|n| n.as_message()).map(|m| m.uid))
            .filter(|&uid| uid != 0)
            .collect();
        uids.sort_unstable();
        uids.dedup();

        if uids.is_empty() {
            self.outcome = TaskOutcome::Failed(Error::UnknownMessageIndex {
                mailbox: self.mailbox_name.clone(),
                index: 0,
            });
            return;
        }

        self.tag = Some(out.emit(CommandBody::Fetch {
            uid: true,
            sequence: SequenceSet::from_sorted(&uids),
            items: vec![
                FetchAttr::Uid,
                FetchAttr::Flags,
                FetchAttr::Envelope,
                FetchAttr::InternalDate,
                FetchAttr::Rfc822Size,
                FetchAttr::BodyStructure,
                FetchAttr::HeaderFields(vec![
                    String::from("References"),
                    String::from("List-Post"),
                ]),
            ],
        }));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        // untagged FETCH data lands in the tree via the maintainer; only
        // the completion is ours
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
            }) if self.tag.as_deref() == Some(tag.as_str()) => {
                self.tag = None;

                // whatever is still not loaded did not come back
                for &id in &self.messages {
                    if model.tree.get(id).is_none() {
                        continue; // expunged meanwhile
                    }
                    let state = model.tree.node(id).fetch_state;
                    if state == FetchState::Loading {
                        model.tree.node_mut(id).fetch_state = if *kind == StateKind::Ok {
                            FetchState::Done
                        } else {
                            FetchState::Unavailable
                        };
                    }
                }

                if self.aborted {
                    self.outcome =
                        TaskOutcome::Failed(Error::Aborted(String::from("fetch cancelled")));
                } else
                if *kind == StateKind::Ok {
                    self.outcome = TaskOutcome::Done;
                } else {
                    self.outcome = TaskOutcome::Failed(Error::Server {
                        kind: *kind,
                        text: text.clone(),
                    });
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
        self.messages.first().copied()
    }
}
