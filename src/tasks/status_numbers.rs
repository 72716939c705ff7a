//! Message counters without selecting: `STATUS (MESSAGES UNSEEN RECENT)`.

use mainsail_proto::{
    command::{CommandBody, StatusItem},
    response::{Response, SocketEvent, State, StateKind},
};

use crate::{
    error::Error,
    events::Event,
    model::{
        tree::{NodeId, NodeKind},
        Model,
    },
    tasks::{Claim, Outgoing, Task, TaskOutcome},
};

pub struct NumberOfMessagesTask {
    mailbox: NodeId,
    mailbox_name: String,
    tag: Option<String>,
    outcome: TaskOutcome,
    aborted: bool,
}

impl NumberOfMessagesTask {
    pub fn new(model: &Model, mailbox: NodeId) -> Self {
        let mailbox_name = model
            .tree
            .node(mailbox)
            .as_mailbox()
            .map(|m| m.metadata.mailbox.clone())
            .unwrap_or_default();
        Self {
            mailbox,
            mailbox_name,
            tag: None,
            outcome: TaskOutcome::Running,
            aborted: false,
        }
    }
}

impl Task for NumberOfMessagesTask {
    fn name(&self) -> &'static str {
        "number-of-messages"
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        self.tag = Some(out.emit(CommandBody::Status {
            mailbox: self.mailbox_name.clone(),
            items: vec![
                StatusItem::Messages,
                StatusItem::Unseen,
                StatusItem::Recent,
            ],
        }));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        match response {
            Response::Socket(SocketEvent::Disconnected { reason }) => {
                self.outcome = TaskOutcome::Failed(Error::Disconnected(reason.clone()));
                Claim::Claimed
            }
            Response::Status(status)
                if self.tag.is_some() && status.mailbox == self.mailbox_name =>
            {
                let list = model.tree.message_list_of(self.mailbox);
                if let NodeKind::MessageList(numbers) = &mut model.tree.node_mut(list).kind {
                    numbers.total = status.messages;
                    numbers.unread = status.unseen;
                    numbers.recent = status.recent;
                }
                model.events.push(Event::DataChanged { node: list });
                model.events.push(Event::DataChanged {
                    node: self.mailbox,
                });
                Claim::Claimed
            }
            Response::State(State {
                tag: Some(tag),
                kind,
                text,
                ..
            }) if self.tag.as_deref() == Some(tag.as_str()) => {
                self.tag = None;
                match kind {
                    _ if self.aborted => {
                        self.outcome =
                            TaskOutcome::Failed(Error::Aborted(String::from("status cancelled")));
                    }
                    StateKind::Ok => self.outcome = TaskOutcome::Done,
                    kind => {
                        // STATUS failures are transient: note it, move on
                        log::warn!("STATUS {} failed: {text}", self.mailbox_name);
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
