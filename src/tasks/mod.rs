//! The cooperative task scheduler.
//!
//! One connection, one scheduler, many logical tasks. Tasks are explicit
//! state machines: they emit tagged commands through [`Outgoing`], register
//! interest by being offered every incoming response in creation order,
//! and settle into `Done` or `Failed`. Nothing blocks; control returns to
//! the embedder between responses.
//!
//! Mailbox-scoped tasks declare the mailbox they need; the scheduler keeps
//! at most one [`keep_mailbox_open::KeepMailboxOpen`] maintainer alive for
//! the selected mailbox, runs
//! [`obtain_sync::ObtainSynchronizedMailbox`] to get there, and serializes
//! dependents behind it. Switching mailboxes drains the current
//! maintainer's dependents, optionally closes the mailbox, and only then
//! selects the next one.

pub mod fetch_metadata;
pub mod fetch_part;
pub mod keep_mailbox_open;
pub mod list_children;
pub mod obtain_sync;
pub mod search;
pub mod simple;
pub mod status_numbers;
pub mod update_flags;

use std::collections::VecDeque;

use mainsail_proto::{
    command::{Command, CommandBody},
    response::{Response, SocketEvent, State, StateKind},
};

use crate::{
    error::Error,
    events::{ConnectionEvent, Event},
    model::Model,
};

use keep_mailbox_open::KeepMailboxOpen;
use obtain_sync::ObtainSynchronizedMailbox;

/// Whether a task recognized a response as its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    NotMine,
}

/// Where a task stands.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Running,
    Done,
    Failed(Error),
}

/// One cooperating task.
pub trait Task {
    fn name(&self) -> &'static str;

    /// The mailbox that must be selected before this task can run.
    fn required_mailbox(&self) -> Option<&str> {
        None
    }

    /// Tasks that are legal before LOGIN (the login task itself, a
    /// capability probe, ID).
    fn runs_before_authentication(&self) -> bool {
        false
    }

    /// Called once, when dependencies are satisfied. Emit commands here.
    fn activate(&mut self, model: &mut Model, out: &mut Outgoing);

    /// Offered every response; claim what belongs to you.
    fn handle(&mut self, model: &mut Model, out: &mut Outgoing, response: &Response) -> Claim;

    fn outcome(&self) -> TaskOutcome;

    /// Stop emitting, keep consuming already-tagged replies, finish
    /// `Failed`.
    fn abort(&mut self, reason: &str);

    /// The node errors should be attributed to.
    fn target_node(&self) -> Option<crate::model::tree::NodeId> {
        None
    }
}

/// Collects outgoing wire bytes and allocates command tags.
#[derive(Debug, Default)]
pub struct Outgoing {
    next_tag: u32,
    wire: Vec<u8>,
    /// Remaining chunks of commands split at synchronizing literals; one
    /// chunk goes out per continuation request.
    continuation_chunks: VecDeque<Vec<u8>>,
    pub literal_plus: bool,
}

impl Outgoing {
    /// Emit one command; returns its tag.
    pub fn emit(&mut self, body: CommandBody) -> String {
        let tag = format!("y{}", self.next_tag);
        self.next_tag += 1;

        let wire = Command::new(tag.clone(), body).serialize(self.literal_plus);
        if wire.continuations.is_empty() {
            self.wire.extend_from_slice(&wire.bytes);
        } else {
            let mut start = 0usize;
            let mut chunks: Vec<Vec<u8>> = Vec::new();
            for &offset in &wire.continuations {
                chunks.push(wire.bytes[start..offset].to_vec());
                start = offset;
            }
            chunks.push(wire.bytes[start..].to_vec());

            self.wire.extend_from_slice(&chunks[0]);
            self.continuation_chunks.extend(chunks.into_iter().skip(1));
        }

        tag
    }

    /// Raw bytes, e.g. the `DONE` of IDLE.
    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.wire.extend_from_slice(bytes);
    }

    /// Feed the next literal chunk after a continuation request. Returns
    /// false when no command was waiting for one.
    fn feed_continuation(&mut self) -> bool {
        match self.continuation_chunks.pop_front() {
            Some(chunk) => {
                self.wire.extend_from_slice(&chunk);
                true
            }
            None => false,
        }
    }

    /// Everything queued for the socket since the last call.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.wire)
    }
}

/// Connection-level state, as far as command legality is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    /// Waiting for the server greeting.
    Connected,
    NotAuthenticated,
    Authenticated,
    Selected(String),
}

/// The scheduler.
pub struct Scheduler {
    pub out: Outgoing,
    conn: ConnState,
    tasks: Vec<Box<dyn Task>>,
    /// Tasks waiting for authentication or for their mailbox.
    queued: Vec<Box<dyn Task>>,
    /// The selected-state maintainer.
    maintainer: Option<KeepMailboxOpen>,
    /// The sync in flight, if any.
    obtain: Option<ObtainSynchronizedMailbox>,
    /// Mailboxes whose selection has been requested.
    pending_select: VecDeque<String>,
    last_activity_ms: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            out: Outgoing::default(),
            conn: ConnState::Disconnected,
            tasks: Vec::new(),
            queued: Vec::new(),
            maintainer: None,
            obtain: None,
            pending_select: VecDeque::new(),
            last_activity_ms: 0,
        }
    }

    pub fn conn_state(&self) -> &ConnState {
        &self.conn
    }

    pub fn selected_mailbox(&self) -> Option<&str> {
        match &self.conn {
            ConnState::Selected(name) => Some(name),
            _ => None,
        }
    }

    /// True when nothing is running or queued.
    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty() && self.queued.is_empty() && self.obtain.is_none()
    }

    // ----- task intake -----

    /// Add a task, activating it right away when its dependencies hold.
    pub fn add_task(&mut self, model: &mut Model, mut task: Box<dyn Task>) {
        match task.required_mailbox() {
            Some(mailbox) => {
                let mailbox = mailbox.to_owned();
                if self.conn == ConnState::Selected(mailbox.clone()) {
                    self.break_idle();
                    task.activate(model, &mut self.out);
                    self.tasks.push(task);
                } else {
                    self.request_select(model, &mailbox);
                    self.queued.push(task);
                }
            }
            None => {
                let ready = matches!(
                    self.conn,
                    ConnState::Authenticated | ConnState::Selected(_)
                ) || (task.runs_before_authentication()
                    && self.conn == ConnState::NotAuthenticated);
                if ready {
                    self.break_idle();
                    task.activate(model, &mut self.out);
                    self.tasks.push(task);
                } else {
                    self.queued.push(task);
                }
            }
        }
    }

    /// Ask for a mailbox to become the selected one.
    pub fn request_select(&mut self, model: &mut Model, mailbox: &str) {
        if self.selected_mailbox() == Some(mailbox)
            || self.obtain.as_ref().is_some_and(|o| o.mailbox() == mailbox)
            || self.pending_select.iter().any(|m| m == mailbox)
        {
            return;
        }
        self.pending_select.push_back(mailbox.to_owned());
        self.advance_selection(model);
    }

    /// Start the next pending selection when the wire allows it.
    fn advance_selection(&mut self, model: &mut Model) {
        if self.obtain.is_some() {
            return;
        }
        let Some(next) = self.pending_select.front().cloned() else {
            return;
        };

        match self.conn.clone() {
            ConnState::Authenticated => {
                self.pending_select.pop_front();
                self.break_idle();
                let mut obtain = ObtainSynchronizedMailbox::new(next);
                obtain.activate(model, &mut self.out);
                self.obtain = Some(obtain);
            }
            ConnState::Selected(current) => {
                // graceful handover: wait for the maintainer's dependents
                let busy = self
                    .tasks
                    .iter()
                    .any(|task| task.required_mailbox() == Some(current.as_str()));
                if busy {
                    return;
                }
                self.break_idle();
                if let Some(maintainer) = &mut self.maintainer {
                    maintainer.begin_close(model, &mut self.out);
                }
            }
            _ => {}
        }
    }

    fn break_idle(&mut self) {
        if let Some(maintainer) = &mut self.maintainer {
            maintainer.ensure_command_window(&mut self.out);
        }
    }

    // ----- response processing -----

    pub fn process(&mut self, model: &mut Model, response: &Response) {
        match response {
            Response::Socket(SocketEvent::Connected) => {
                self.conn = ConnState::Connected;
                model.events.push(Event::Connection(ConnectionEvent::Connecting));
                return;
            }
            Response::Socket(SocketEvent::TlsEstablished) => return,
            Response::Socket(SocketEvent::Disconnected { reason }) => {
                self.handle_disconnect(model, reason);
                return;
            }
            _ => {}
        }

        // the greeting decides where this connection starts
        if self.conn == ConnState::Connected {
            if let Response::State(State { tag: None, kind, code, .. }) = response {
                match kind {
                    StateKind::Ok => self.conn = ConnState::NotAuthenticated,
                    StateKind::PreAuth => {
                        self.conn = ConnState::Authenticated;
                        model
                            .events
                            .push(Event::Connection(ConnectionEvent::Authenticated));
                    }
                    StateKind::Bye => {
                        self.handle_disconnect(model, "server said BYE in the greeting");
                        return;
                    }
                    _ => {}
                }
                if let Some(mainsail_proto::response::RespCode::Capabilities(caps)) = code {
                    model.set_capabilities(caps);
                }
                self.activate_unscoped_tasks(model);
                return;
            }
        }

        // a continuation request feeds a waiting literal before anything
        // else gets a say
        if matches!(response, Response::ContinueRequest(_)) && self.out.feed_continuation() {
            return;
        }

        if let Response::ParseFailure(error) = response {
            log::error!("parser: {error}");
            model.events.push(Event::Error {
                path: String::new(),
                short_message: String::from("Malformed server response"),
                long_message: error.to_string(),
            });
            // fall through: tasks may still want to fail on it
        }

        // the sync in flight gets the first look
        if let Some(mut obtain) = self.obtain.take() {
            let claim = obtain.handle(model, &mut self.out, response);
            match obtain.outcome() {
                TaskOutcome::Running => {
                    self.obtain = Some(obtain);
                    if claim == Claim::Claimed {
                        return;
                    }
                }
                TaskOutcome::Done => {
                    let mailbox = obtain.mailbox().to_owned();
                    self.conn = ConnState::Selected(mailbox.clone());
                    model
                        .events
                        .push(Event::Connection(ConnectionEvent::Selected));
                    self.maintainer = Some(KeepMailboxOpen::new(mailbox.clone()));
                    self.activate_tasks_for(model, &mailbox);
                    self.advance_selection(model);
                    return;
                }
                TaskOutcome::Failed(error) => {
                    let mailbox = obtain.mailbox().to_owned();
                    self.conn = ConnState::Authenticated;
                    self.fail_queued_for(model, &mailbox, &error);
                    self.report_task_error(model, obtain.target_node(), "Mailbox synchronization failed", &error);
                    if error.is_fatal_to_connection() {
                        self.handle_disconnect(model, &error.to_string());
                    } else {
                        self.advance_selection(model);
                    }
                    return;
                }
            }
        }

        // then the maintainer
        if let Some(mut maintainer) = self.maintainer.take() {
            let claim = maintainer.handle(model, &mut self.out, response);
            if maintainer.take_wants_resync() {
                // mailbox state broke; drop the selection and sync afresh
                let mailbox = maintainer.mailbox().to_owned();
                self.conn = ConnState::Authenticated;
                self.request_select(model, &mailbox);
                return;
            }
            match maintainer.outcome() {
                TaskOutcome::Running => {
                    self.maintainer = Some(maintainer);
                    if claim == Claim::Claimed {
                        return;
                    }
                }
                TaskOutcome::Done => {
                    // the mailbox was closed gracefully
                    self.conn = ConnState::Authenticated;
                    self.advance_selection(model);
                    return;
                }
                TaskOutcome::Failed(error) => {
                    self.conn = ConnState::Authenticated;
                    self.report_task_error(
                        model,
                        maintainer.target_node(),
                        "Mailbox connection lost",
                        &error,
                    );
                    if error.is_fatal_to_connection() {
                        self.handle_disconnect(model, &error.to_string());
                    }
                    return;
                }
            }
        }

        // generic tasks, in creation order
        let mut index = 0;
        while index < self.tasks.len() {
            let claim = self.tasks[index].handle(model, &mut self.out, response);
            let outcome = self.tasks[index].outcome();
            match outcome {
                TaskOutcome::Running => {
                    if claim == Claim::Claimed {
                        return;
                    }
                    index += 1;
                }
                TaskOutcome::Done => {
                    let task = self.tasks.remove(index);
                    if task.name() == "login" {
                        // LOGIN moved us into the authenticated state
                        self.authenticated(model);
                    }
                    self.advance_selection(model);
                    return;
                }
                TaskOutcome::Failed(error) => {
                    let task = self.tasks.remove(index);
                    self.report_task_error(model, task.target_node(), task.name(), &error);
                    if error.is_fatal_to_connection() {
                        self.handle_disconnect(model, &error.to_string());
                    } else {
                        self.advance_selection(model);
                    }
                    return;
                }
            }
        }

        self.handle_unclaimed(model, response);
    }

    /// Responses nobody claimed.
    fn handle_unclaimed(&mut self, model: &mut Model, response: &Response) {
        match response {
            Response::Capability(caps) => model.set_capabilities(caps),
            Response::State(State { tag: None, kind: StateKind::Bye, text, .. }) => {
                self.handle_disconnect(model, &format!("server closed the connection: {text}"));
            }
            Response::State(State { tag: None, .. }) => {
                log::debug!("unclaimed untagged state response: {response:?}");
            }
            Response::ParseFailure(_) => {}
            Response::ContinueRequest(_) => {
                log::debug!("continuation request with no literal pending");
            }
            other => {
                // a response the current state machines cannot accept
                log::error!("unexpected response received: {other:?}");
                model.events.push(Event::Error {
                    path: String::new(),
                    short_message: String::from("Unexpected response received"),
                    long_message: format!("{other:?}"),
                });
            }
        }
    }

    fn handle_disconnect(&mut self, model: &mut Model, reason: &str) {
        let error = Error::Disconnected(reason.to_owned());

        for mut task in self.tasks.drain(..).chain(self.queued.drain(..)) {
            task.abort(reason);
            let _ = task.handle(
                model,
                &mut self.out,
                &Response::Socket(SocketEvent::Disconnected {
                    reason: reason.to_owned(),
                }),
            );
        }
        if let Some(mut obtain) = self.obtain.take() {
            let _ = obtain.handle(
                model,
                &mut self.out,
                &Response::Socket(SocketEvent::Disconnected {
                    reason: reason.to_owned(),
                }),
            );
        }
        self.maintainer = None;
        self.pending_select.clear();
        self.conn = ConnState::Disconnected;

        model
            .events
            .push(Event::Connection(ConnectionEvent::Disconnected));
        model.events.push(Event::Error {
            path: String::new(),
            short_message: String::from("Disconnected"),
            long_message: error.to_string(),
        });
    }

    fn report_task_error(
        &mut self,
        model: &mut Model,
        node: Option<crate::model::tree::NodeId>,
        what: &str,
        error: &Error,
    ) {
        match node {
            Some(node) => model.push_error(node, what, error.to_string()),
            None => model.events.push(Event::Error {
                path: String::new(),
                short_message: what.to_owned(),
                long_message: error.to_string(),
            }),
        }
    }

    /// Called when authentication completes.
    pub fn authenticated(&mut self, model: &mut Model) {
        self.conn = ConnState::Authenticated;
        model
            .events
            .push(Event::Connection(ConnectionEvent::Authenticated));
        self.activate_unscoped_tasks(model);
        self.advance_selection(model);
    }

    fn activate_unscoped_tasks(&mut self, model: &mut Model) {
        let authenticated = matches!(
            self.conn,
            ConnState::Authenticated | ConnState::Selected(_)
        );
        let pre_auth = self.conn == ConnState::NotAuthenticated;
        if !authenticated && !pre_auth {
            return;
        }

        let (ready, waiting): (Vec<_>, Vec<_>) =
            self.queued.drain(..).partition(|task| {
                task.required_mailbox().is_none()
                    && (authenticated || task.runs_before_authentication())
            });
        self.queued = waiting;
        for mut task in ready {
            task.activate(model, &mut self.out);
            self.tasks.push(task);
        }
    }

    fn activate_tasks_for(&mut self, model: &mut Model, mailbox: &str) {
        let (ready, waiting): (Vec<_>, Vec<_>) = self
            .queued
            .drain(..)
            .partition(|task| task.required_mailbox() == Some(mailbox));
        self.queued = waiting;
        for mut task in ready {
            task.activate(model, &mut self.out);
            self.tasks.push(task);
        }
    }

    fn fail_queued_for(&mut self, model: &mut Model, mailbox: &str, error: &Error) {
        let (failed, waiting): (Vec<_>, Vec<_>) = self
            .queued
            .drain(..)
            .partition(|task| task.required_mailbox() == Some(mailbox));
        self.queued = waiting;
        for task in failed {
            self.report_task_error(model, task.target_node(), task.name(), error);
        }
    }

    // ----- timers -----

    /// Timer tick; `now_ms` is a monotonic milliseconds clock.
    pub fn tick(&mut self, model: &mut Model, now_ms: u64) {
        if self.last_activity_ms == 0 {
            self.last_activity_ms = now_ms;
        }

        if let Some(maintainer) = &mut self.maintainer {
            maintainer.tick(
                model,
                &mut self.out,
                now_ms,
                self.tasks.is_empty() && self.obtain.is_none(),
            );
        }
        self.last_activity_ms = now_ms;
    }

    /// Abort everything (logout, shutdown).
    pub fn abort_all(&mut self, reason: &str) {
        for task in &mut self.tasks {
            task.abort(reason);
        }
        for task in &mut self.queued {
            task.abort(reason);
        }
    }
}
