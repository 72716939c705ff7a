//! Changing message flags: `UID STORE ... FLAGS.SILENT`.

use mainsail_proto::{
    command::{CommandBody, FetchAttr, StoreAction},
    fetch::{FetchItem, FetchResponse},
    response::{Response, SocketEvent, State, StateKind},
    sequence::SequenceSet,
};

use crate::{
    error::Error,
    model::{tree::NodeId, Model},
    tasks::{Claim, Outgoing, Task, TaskOutcome},
};

pub struct UpdateFlagsTask {
    mailbox_name: String,
    uids: Vec<u32>,
    action: StoreAction,
    flags: Vec<String>,
    tag: Option<String>,
    /// Re-learn flags after a failed STORE.
    recovery_tag: Option<String>,
    outcome: TaskOutcome,
    aborted: bool,
}

impl UpdateFlagsTask {
    pub fn new(mailbox_name: String, uids: Vec<u32>, action: StoreAction, flags: Vec<String>) -> Self {
        Self {
            mailbox_name,
            uids,
            action,
            flags,
            tag: None,
            recovery_tag: None,
            outcome: TaskOutcome::Running,
            aborted: false,
        }
    }

    /// The local view of the flags after this change, applied eagerly.
    fn apply_locally(&self, model: &mut Model) {
        let Some(mailbox) = model.tree.find_mailbox(&self.mailbox_name) else {
            return;
        };
        let list = model.tree.message_list_of(mailbox);

        for &uid in &self.uids {
            let Ok(offset) = model.tree.find_uid(list, uid) else {
                continue;
            };
            let Some(id) = model.tree.message_at(list, offset) else {
                continue;
            };
            let current = model
                .tree
                .node(id)
                .as_message()
                .map(|m| model.flags.render(&m.flags))
                .unwrap_or_default();

            let mut next: Vec<String> = match self.action {
                StoreAction::Replace => self.flags.clone(),
                StoreAction::Add => {
                    let mut next = current;
                    for flag in &self.flags {
                        if !next.iter().any(|f| f.eq_ignore_ascii_case(flag)) {
                            next.push(flag.clone());
                        }
                    }
                    next
                }
                StoreAction::Remove => current
                    .into_iter()
                    .filter(|f| !self.flags.iter().any(|x| x.eq_ignore_ascii_case(f)))
                    .collect(),
            };
            next.sort();

            // reuse the FETCH FLAGS path so cache and counters stay honest
            let seq = offset as u32 + 1;
            let synthetic = FetchResponse {
                seq,
                items: vec![FetchItem::Uid(uid), FetchItem::Flags(next)],
            };
            if let Err(error) = model.apply_fetch(mailbox, &synthetic) {
                log::warn!("{}: local flag update failed: {error}", self.mailbox_name);
            }
        }
    }
}

impl Task for UpdateFlagsTask {
    fn name(&self) -> &'static str {
        "update-flags"
    }

    fn required_mailbox(&self) -> Option<&str> {
        Some(&self.mailbox_name)
    }

    fn activate(&mut self, model: &mut Model, out: &mut Outgoing) {
        let mut uids = self.uids.clone();
        uids.sort_unstable();
        uids.dedup();
        self.uids = uids;

        self.tag = Some(out.emit(CommandBody::Store {
            uid: true,
            sequence: SequenceSet::from_sorted(&self.uids),
            action: self.action,
            silent: true,
            flags: self.flags.clone(),
            unchanged_since: None,
        }));

        // optimistic: the UI flips immediately, a failure re-syncs
        self.apply_locally(model);
    }

    fn handle(&mut self, model: &mut Model, out: &mut Outgoing, response: &Response) -> Claim {
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
                match kind {
                    StateKind::Ok => {
                        if self.aborted {
                            self.outcome = TaskOutcome::Failed(Error::Aborted(String::from(
                                "flag update cancelled",
                            )));
                        } else {
                            self.outcome = TaskOutcome::Done;
                        }
                    }
                    kind => {
                        // the optimistic local change is now a lie; ask the
                        // server what the flags really are
                        log::warn!(
                            "{}: STORE failed ({text}), re-fetching flags",
                            self.mailbox_name
                        );
                        self.recovery_tag = Some(out.emit(CommandBody::Fetch {
                            uid: true,
                            sequence: SequenceSet::from_sorted(&self.uids),
                            items: vec![FetchAttr::Flags],
                        }));
                        self.outcome = TaskOutcome::Running;
                        let _ = kind;
                    }
                }
                Claim::Claimed
            }
            Response::State(State {
                tag: Some(tag),
                ..
            }) if self.recovery_tag.as_deref() == Some(tag.as_str()) => {
                self.recovery_tag = None;
                self.outcome = TaskOutcome::Failed(Error::Server {
                    kind: StateKind::No,
                    text: String::from("flag update rejected by the server"),
                });
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
        None
    }
}
