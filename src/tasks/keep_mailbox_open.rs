//! The long-lived owner of the selected mailbox.
//!
//! Exactly one of these is alive per connection. It absorbs unsolicited
//! selected-state traffic (EXISTS, EXPUNGE, FETCH, VANISHED, FLAGS),
//! keeps the session alive with IDLE or NOOP, serializes dependents, and
//! performs the graceful close when the scheduler wants a different
//! mailbox selected.

use mainsail_proto::{
    command::{CommandBody, FetchAttr},
    response::{RespCode, Response, State, StateKind},
    sequence::SequenceSet,
};

use crate::{
    error::Error,
    events::Event,
    model::{tree::NodeId, Model},
    tasks::{Claim, Outgoing, TaskOutcome},
};

pub struct KeepMailboxOpen {
    mailbox_name: String,
    outcome: TaskOutcome,
    /// IDLE issued, waiting for the continuation request.
    idle_pending: bool,
    /// Inside IDLE.
    idling: bool,
    /// DONE sent, waiting for the tagged OK of IDLE.
    idle_finishing: bool,
    /// Send DONE as soon as the continuation request shows up.
    done_after_continue: bool,
    idle_tag: Option<String>,
    noop_tag: Option<String>,
    closing_tag: Option<String>,
    fetch_tags: Vec<String>,
    last_keepalive_ms: u64,
    /// The mailbox state broke; the scheduler should resync.
    wants_resync: bool,
}

impl KeepMailboxOpen {
    pub fn new(mailbox_name: String) -> Self {
        Self {
            mailbox_name,
            outcome: TaskOutcome::Running,
            idle_pending: false,
            idling: false,
            idle_finishing: false,
            done_after_continue: false,
            idle_tag: None,
            noop_tag: None,
            closing_tag: None,
            fetch_tags: Vec::new(),
            last_keepalive_ms: 0,
            wants_resync: false,
        }
    }

    pub fn mailbox(&self) -> &str {
        &self.mailbox_name
    }

    pub fn outcome(&self) -> TaskOutcome {
        self.outcome.clone()
    }

    pub fn target_node(&self) -> Option<NodeId> {
        None
    }

    /// Did the mailbox state break badly enough for a fresh sync?
    pub fn take_wants_resync(&mut self) -> bool {
        std::mem::take(&mut self.wants_resync)
    }

    fn node(&self, model: &Model) -> Option<NodeId> {
        model.tree.find_mailbox(&self.mailbox_name)
    }

    /// Break out of IDLE so that a command can be sent. Nothing else may
    /// hit the wire between IDLE and its DONE.
    pub fn ensure_command_window(&mut self, out: &mut Outgoing) {
        if self.idling && !self.idle_finishing {
            out.push_raw(&mainsail_proto::command::idle_done());
            self.idling = false;
            self.idle_finishing = true;
        } else if self.idle_pending {
            self.done_after_continue = true;
        }
    }

    /// Graceful handover: leave the selected state.
    pub fn begin_close(&mut self, model: &mut Model, out: &mut Outgoing) {
        if self.closing_tag.is_some() {
            return;
        }
        self.ensure_command_window(out);
        let body = if model.has_capability("UNSELECT") {
            CommandBody::Unselect
        } else {
            CommandBody::Close
        };
        self.closing_tag = Some(out.emit(body));
    }

    /// Keepalive duty. `may_idle` is false while other tasks own the wire.
    pub fn tick(&mut self, model: &mut Model, out: &mut Outgoing, now_ms: u64, may_idle: bool) {
        if self.closing_tag.is_some() || self.idle_finishing {
            return;
        }
        if self.last_keepalive_ms == 0 {
            self.last_keepalive_ms = now_ms;
            return;
        }

        let period = model.config.noop_period_ms;
        if self.idling || self.idle_pending {
            if now_ms.saturating_sub(self.last_keepalive_ms) >= period {
                // re-arm IDLE so the server does not time us out
                self.ensure_command_window(out);
                self.last_keepalive_ms = now_ms;
            }
            return;
        }

        if !may_idle {
            return;
        }

        if now_ms.saturating_sub(self.last_keepalive_ms) >= period {
            if model.has_capability("IDLE") {
                self.idle_tag = Some(out.emit(CommandBody::Idle));
                self.idle_pending = true;
            } else {
                self.noop_tag = Some(out.emit(CommandBody::Noop));
            }
            self.last_keepalive_ms = now_ms;
        }
    }

    fn commit(&self, model: &mut Model) {
        if let Some(node) = self.node(model) {
            model.commit_sync_state(node);
        }
    }

    fn broken_mailbox(&mut self, model: &mut Model, message: String) {
        log::error!("{}: {message}", self.mailbox_name);
        model.cache.clear_all_messages(&self.mailbox_name);
        model.cache.clear_uid_mapping(&self.mailbox_name);
        model.mark_force_full_resync(&self.mailbox_name);
        if let Some(node) = self.node(model) {
            model.push_error(node, "Mailbox state broken", message);
        } else {
            model.events.push(Event::Error {
                path: self.mailbox_name.clone(),
                short_message: String::from("Mailbox state broken"),
                long_message: message,
            });
        }
        self.wants_resync = true;
    }

    pub fn handle(&mut self, model: &mut Model, out: &mut Outgoing, response: &Response) -> Claim {
        match response {
            Response::ContinueRequest(_) if self.idle_pending => {
                self.idle_pending = false;
                self.idling = true;
                if std::mem::take(&mut self.done_after_continue) {
                    out.push_raw(&mainsail_proto::command::idle_done());
                    self.idling = false;
                    self.idle_finishing = true;
                }
                Claim::Claimed
            }

            Response::Exists(n) => {
                let Some(node) = self.node(model) else {
                    return Claim::NotMine;
                };
                let list = model.tree.message_list_of(node);
                let current = model.tree.node(list).children.len();

                match (*n as usize).cmp(&current) {
                    std::cmp::Ordering::Greater => {
                        let count = *n as usize - current;
                        let first = model.tree.append_placeholder_messages(list, count);
                        model.events.push(Event::RowsInserted {
                            parent: list,
                            first,
                            count,
                        });
                        let max_uid = model.tree.uid_map(list).into_iter().max().unwrap_or(0);
                        self.ensure_command_window(out);
                        self.fetch_tags.push(out.emit(CommandBody::Fetch {
                            uid: true,
                            sequence: SequenceSet::from(max_uid + 1),
                            items: vec![FetchAttr::Flags],
                        }));
                        model.sync_state_mut(&self.mailbox_name).set_exists(*n);
                    }
                    std::cmp::Ordering::Less => {
                        self.broken_mailbox(
                            model,
                            format!("untagged EXISTS dropped from {current} to {n}"),
                        );
                    }
                    std::cmp::Ordering::Equal => {}
                }
                Claim::Claimed
            }

            Response::Recent(n) => {
                model.sync_state_mut(&self.mailbox_name).set_recent(*n);
                Claim::Claimed
            }

            Response::Flags(flags) => {
                model
                    .sync_state_mut(&self.mailbox_name)
                    .set_flags(flags.clone());
                Claim::Claimed
            }

            Response::Expunge(seq) => {
                let Some(node) = self.node(model) else {
                    return Claim::NotMine;
                };
                match model.apply_expunge(node, *seq, true) {
                    Ok(_) => {
                        let list = model.tree.message_list_of(node);
                        let exists = model.tree.node(list).children.len() as u32;
                        model.sync_state_mut(&self.mailbox_name).set_exists(exists);
                        self.commit(model);
                    }
                    Err(error) => {
                        self.broken_mailbox(model, error.to_string());
                    }
                }
                Claim::Claimed
            }

            Response::Vanished(vanished) => {
                let Some(node) = self.node(model) else {
                    return Claim::NotMine;
                };
                model.apply_vanished(node, &vanished.uids, vanished.earlier);
                let list = model.tree.message_list_of(node);
                let exists = model.tree.node(list).children.len() as u32;
                model.sync_state_mut(&self.mailbox_name).set_exists(exists);
                self.commit(model);
                Claim::Claimed
            }

            Response::Fetch(fetch) => {
                let Some(node) = self.node(model) else {
                    return Claim::NotMine;
                };
                match model.apply_fetch(node, fetch) {
                    Ok(()) => {
                        if fetch.uid().is_some() {
                            // a new arrival just got its UID; keep the
                            // cached map in step
                            self.commit(model);
                        }
                    }
                    Err(error @ Error::Mailbox { .. }) => {
                        self.broken_mailbox(model, error.to_string());
                    }
                    Err(error) => {
                        log::warn!("{}: {error}", self.mailbox_name);
                    }
                }
                Claim::Claimed
            }

            Response::State(State { tag: None, code: Some(code), .. }) => match code {
                RespCode::UidNext(n) => {
                    model.sync_state_mut(&self.mailbox_name).set_uid_next(*n);
                    Claim::Claimed
                }
                RespCode::HighestModSeq(n) => {
                    model
                        .sync_state_mut(&self.mailbox_name)
                        .set_highest_mod_seq(*n);
                    Claim::Claimed
                }
                RespCode::PermanentFlags(flags) => {
                    model
                        .sync_state_mut(&self.mailbox_name)
                        .set_permanent_flags(flags.clone());
                    Claim::Claimed
                }
                RespCode::UidValidity(n) => {
                    let state = model.sync_state_mut(&self.mailbox_name);
                    if state.has_uid_validity() && state.uid_validity() != *n {
                        self.broken_mailbox(
                            model,
                            format!("UIDVALIDITY changed mid-session to {n}"),
                        );
                    } else {
                        model
                            .sync_state_mut(&self.mailbox_name)
                            .set_uid_validity(*n);
                    }
                    Claim::Claimed
                }
                _ => Claim::NotMine,
            },

            Response::State(state) => {
                let Some(tag) = state.tag.as_deref() else {
                    return Claim::NotMine;
                };

                if self.idle_tag.as_deref() == Some(tag) {
                    self.idle_tag = None;
                    self.idle_pending = false;
                    self.idling = false;
                    self.idle_finishing = false;
                    if state.kind != StateKind::Ok {
                        log::debug!(
                            "{}: server rejected IDLE: {}",
                            self.mailbox_name,
                            state.text
                        );
                    }
                    return Claim::Claimed;
                }
                if self.noop_tag.as_deref() == Some(tag) {
                    self.noop_tag = None;
                    return Claim::Claimed;
                }
                if self.closing_tag.as_deref() == Some(tag) {
                    self.closing_tag = None;
                    match state.kind {
                        StateKind::Ok => self.outcome = TaskOutcome::Done,
                        kind => {
                            self.outcome = TaskOutcome::Failed(Error::Server {
                                kind,
                                text: state.text.clone(),
                            })
                        }
                    }
                    return Claim::Claimed;
                }
                if let Some(position) = self
                    .fetch_tags
                    .iter()
                    .position(|mine| mine.as_str() == tag)
                {
                    self.fetch_tags.remove(position);
                    if state.kind != StateKind::Ok {
                        log::warn!(
                            "{}: flag fetch for new arrivals failed: {}",
                            self.mailbox_name,
                            state.text
                        );
                    }
                    return Claim::Claimed;
                }
                Claim::NotMine
            }

            _ => Claim::NotMine,
        }
    }
}
