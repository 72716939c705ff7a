//! Listing the child mailboxes of one mailbox.

use mainsail_proto::{
    command::CommandBody,
    response::{Response, SocketEvent, State, StateKind},
};

use crate::{
    error::Error,
    model::{metadata::MailboxMetadata, tree::NodeId, Model},
    tasks::{Claim, Outgoing, Task, TaskOutcome},
};

/// `LIST "" <prefix>%` for one level of the hierarchy.
pub struct ListChildMailboxesTask {
    mailbox: NodeId,
    tag: Option<String>,
    collected: Vec<MailboxMetadata>,
    /// Only responses under this prefix belong to us.
    prefix: String,
    outcome: TaskOutcome,
    aborted: bool,
}

impl ListChildMailboxesTask {
    pub fn new(mailbox: NodeId) -> Self {
        Self {
            mailbox,
            tag: None,
            collected: Vec::new(),
            prefix: String::new(),
            outcome: TaskOutcome::Running,
            aborted: false,
        }
    }
}

impl Task for ListChildMailboxesTask {
    fn name(&self) -> &'static str {
        "list-child-mailboxes"
    }

    fn activate(&mut self, model: &mut Model, out: &mut Outgoing) {
        let metadata = model
            .tree
            .node(self.mailbox)
            .as_mailbox()
            .map(|m| m.metadata.clone())
            .unwrap_or_default();

        let pattern = if metadata.mailbox.is_empty() {
            String::from("%")
        } else {
            let separator = if metadata.separator.is_empty() {
                "/"
            } else {
                &metadata.separator
            };
            format!("{}{}%", metadata.mailbox, separator)
        };
        self.prefix = metadata.mailbox;

        self.tag = Some(out.emit(CommandBody::List {
            reference: String::new(),
            pattern,
        }));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        match response {
            Response::Socket(SocketEvent::Disconnected { reason }) => {
                self.outcome = TaskOutcome::Failed(Error::Disconnected(reason.clone()));
                Claim::Claimed
            }
            Response::List(list) if !list.lsub && self.tag.is_some() => {
                if list.mailbox == self.prefix {
                    // the server echoing the parent itself is fine, just
                    // not a child
                    return Claim::Claimed;
                }
                self.collected.push(Model::list_response_to_metadata(list));
                Claim::Claimed
            }
            Response::State(State {
                tag: Some(tag),
                kind,
                text,
                ..
            }) if self.tag.as_deref() == Some(tag.as_str()) => {
                self.tag = None;
                if self.aborted {
                    self.outcome =
                        TaskOutcome::Failed(Error::Aborted(String::from("listing cancelled")));
                    return Claim::Claimed;
                }
                match kind {
                    StateKind::Ok => {
                        let mut collected = std::mem::take(&mut self.collected);
                        collected.sort_by(|a, b| a.mailbox.cmp(&b.mailbox));
                        collected.dedup_by(|a, b| a.mailbox == b.mailbox);
                        model.set_child_mailboxes(self.mailbox, collected);
                        self.outcome = TaskOutcome::Done;
                    }
                    kind => {
                        self.outcome = TaskOutcome::Failed(Error::Server {
                            kind: *kind,
                            text: text.clone(),
                        });
                    }
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
        Some(self.mailbox)
    }
}
