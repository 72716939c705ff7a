//! Server-side SEARCH, SORT and THREAD.

use mainsail_proto::{
    command::CommandBody,
    extensions::sort_thread::ThreadNode,
    response::{Response, SocketEvent, State, StateKind},
};

use crate::{
    error::Error,
    events::Event,
    model::{tree::NodeId, Model},
    tasks::{Claim, Outgoing, Task, TaskOutcome},
};

/// What flavor of query to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKind {
    /// `UID SEARCH <criteria>` (ESEARCH form when available).
    Search,
    /// `UID SORT (<criteria>) <charset> <search>`.
    Sort { criteria: Vec<String> },
    /// `UID THREAD <algorithm> <charset> <search>`.
    Thread { algorithm: String },
}

pub struct SearchTask {
    mailbox: NodeId,
    mailbox_name: String,
    kind: SearchKind,
    search: String,
    tag: Option<String>,
    uids: Vec<u32>,
    threads: Vec<ThreadNode>,
    outcome: TaskOutcome,
    aborted: bool,
}

impl SearchTask {
    pub fn new(model: &Model, mailbox: NodeId, kind: SearchKind, search: String) -> Self {
        let mailbox_name = model
            .tree
            .node(mailbox)
            .as_mailbox()
            .map(|m| m.metadata.mailbox.clone())
            .unwrap_or_default();
        Self {
            mailbox,
            mailbox_name,
            kind,
            search,
            tag: None,
            uids: Vec::new(),
            threads: Vec::new(),
            outcome: TaskOutcome::Running,
            aborted: false,
        }
    }
}

impl Task for SearchTask {
    fn name(&self) -> &'static str {
        "search"
    }

    fn required_mailbox(&self) -> Option<&str> {
        Some(&self.mailbox_name)
    }

    fn activate(&mut self, model: &mut Model, out: &mut Outgoing) {
        let body = match &self.kind {
            SearchKind::Search => CommandBody::Search {
                uid: true,
                criteria: self.search.clone(),
                return_all: model.has_capability("ESEARCH"),
            },
            SearchKind::Sort { criteria } => CommandBody::Sort {
                uid: true,
                criteria: criteria.clone(),
                charset: String::from("UTF-8"),
                search: self.search.clone(),
            },
            SearchKind::Thread { algorithm } => CommandBody::Thread {
                uid: true,
                algorithm: algorithm.clone(),
                charset: String::from("UTF-8"),
                search: self.search.clone(),
            },
        };
        self.tag = Some(out.emit(body));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        if self.tag.is_none() {
            return Claim::NotMine;
        }

        match response {
            Response::Socket(SocketEvent::Disconnected { reason }) => {
                self.outcome = TaskOutcome::Failed(Error::Disconnected(reason.clone()));
                Claim::Claimed
            }
            Response::Search(numbers) if self.kind == SearchKind::Search => {
                self.uids = numbers.clone();
                Claim::Claimed
            }
            Response::ESearch(esearch) if self.kind == SearchKind::Search => {
                // the correlator, when present, must be ours
                if esearch
                    .tag
                    .as_deref()
                    .is_some_and(|t| self.tag.as_deref() != Some(t))
                {
                    return Claim::NotMine;
                }
                if let Some((_, set)) = esearch
                    .list_data
                    .iter()
                    .find(|(label, _)| label == "ALL")
                {
                    self.uids = set.expand_finite().unwrap_or_default();
                }
                Claim::Claimed
            }
            Response::Sort(numbers) if matches!(self.kind, SearchKind::Sort { .. }) => {
                self.uids = numbers.clone();
                Claim::Claimed
            }
            Response::Thread(threads) if matches!(self.kind, SearchKind::Thread { .. }) => {
                self.threads = threads.clone();
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
                        TaskOutcome::Failed(Error::Aborted(String::from("search cancelled")));
                    return Claim::Claimed;
                }
                match kind {
                    StateKind::Ok => {
                        let event = match &self.kind {
                            SearchKind::Thread { .. } => Event::ThreadingCompleted {
                                mailbox: self.mailbox,
                                threads: std::mem::take(&mut self.threads),
                            },
                            _ => Event::SearchCompleted {
                                mailbox: self.mailbox,
                                uids: std::mem::take(&mut self.uids),
                            },
                        };
                        model.events.push(event);
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
