//! The session: one connection's worth of model, scheduler and framing.
//!
//! The embedder owns the socket and the clock:
//!
//! * bytes read from the socket go into [`Session::feed`];
//! * bytes from [`Session::take_wire_output`] go to the socket;
//! * a periodic timer calls [`Session::tick`];
//! * the view consumes [`Session::take_events`] and queries through
//!   [`Session::data`] / [`Session::row_count`].

use chrono::{DateTime, FixedOffset};
use mainsail_proto::{
    command::StoreAction,
    frames::FrameAssembler,
    response::{parse_response, Response, SocketEvent},
};

use crate::{
    cache::Cache,
    config::Config,
    error::Error,
    events::Event,
    model::{
        roles::{Role, Value},
        tree::NodeId,
        Model, ModelRequest,
    },
    tasks::{
        fetch_metadata::FetchMsgMetadataTask,
        fetch_part::FetchMsgPartTask,
        list_children::ListChildMailboxesTask,
        search::{SearchKind, SearchTask},
        simple::{
            AppendTask, CapabilityTask, CopyMessagesTask, EnableTask, ExpungeMailboxTask,
            GenUrlAuthTask, IdTask, LoginTask, LogoutTask, NamespaceTask,
            SubscribeUnsubscribeTask,
        },
        status_numbers::NumberOfMessagesTask,
        update_flags::UpdateFlagsTask,
        Scheduler,
    },
};

pub struct Session {
    pub model: Model,
    scheduler: Scheduler,
    frames: FrameAssembler,
    /// Part fetches waiting out the batching window.
    pending_parts: Vec<NodeId>,
    parts_flush_due_ms: Option<u64>,
    now_ms: u64,
}

impl Session {
    pub fn new(cache: Box<dyn Cache>, config: Config) -> Self {
        Self {
            model: Model::new(cache, config),
            scheduler: Scheduler::new(),
            frames: FrameAssembler::new(),
            pending_parts: Vec::new(),
            parts_flush_due_ms: None,
            now_ms: 0,
        }
    }

    // ----- transport plumbing -----

    pub fn socket_connected(&mut self) {
        self.process_response(Response::Socket(SocketEvent::Connected));
    }

    pub fn tls_established(&mut self) {
        self.process_response(Response::Socket(SocketEvent::TlsEstablished));
    }

    pub fn socket_disconnected(&mut self, reason: &str) {
        self.frames.clear();
        self.process_response(Response::Socket(SocketEvent::Disconnected {
            reason: reason.to_owned(),
        }));
    }

    /// Bytes fresh off the socket.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.frames.feed(bytes);
        while let Some(frame) = self.frames.next_frame() {
            let response = match parse_response(&frame) {
                Ok(response) => response,
                Err(error) => Response::ParseFailure(error),
            };
            self.process_response(response);
        }
    }

    /// One already-parsed response. Public so that scripted tests (and
    /// unusual transports) can push responses directly.
    pub fn process_response(&mut self, response: Response) {
        self.scheduler.process(&mut self.model, &response);
        self.drain_model_requests();
    }

    /// Everything the scheduler wants written to the socket.
    pub fn take_wire_output(&mut self) -> Vec<u8> {
        self.scheduler.out.take()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.model.events.drain()
    }

    /// Timer tick with a monotonic milliseconds clock.
    pub fn tick(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        if self
            .parts_flush_due_ms
            .is_some_and(|due| now_ms >= due)
        {
            self.flush_part_fetches();
        }
        self.scheduler.tick(&mut self.model, now_ms);
        self.drain_model_requests();
    }

    // ----- view-facing queries -----

    pub fn data(&mut self, node: NodeId, role: Role) -> Value {
        let value = self.model.data(node, role);
        self.drain_model_requests();
        value
    }

    pub fn row_count(&mut self, node: NodeId) -> usize {
        let count = self.model.row_count(node);
        self.drain_model_requests();
        count
    }

    pub fn root(&self) -> NodeId {
        self.model.tree.root()
    }

    // ----- explicit operations -----

    pub fn login(&mut self, user: &str, password: &str) {
        self.scheduler.add_task(
            &mut self.model,
            Box::new(LoginTask::new(user.to_owned(), password.to_owned())),
        );
    }

    pub fn logout(&mut self) {
        self.scheduler.abort_all("logging out");
        self.scheduler
            .add_task(&mut self.model, Box::new(LogoutTask::new()));
    }

    pub fn probe_capabilities(&mut self) {
        self.scheduler
            .add_task(&mut self.model, Box::new(CapabilityTask::new()));
    }

    pub fn enable_extensions(&mut self, extensions: Vec<String>) {
        self.scheduler
            .add_task(&mut self.model, Box::new(EnableTask::new(extensions)));
    }

    pub fn send_id(&mut self, fields: Option<Vec<(String, String)>>) {
        self.scheduler
            .add_task(&mut self.model, Box::new(IdTask::new(fields)));
    }

    pub fn fetch_namespace(&mut self) {
        self.scheduler
            .add_task(&mut self.model, Box::new(NamespaceTask::new()));
    }

    pub fn select_mailbox(&mut self, name: &str) {
        self.scheduler.request_select(&mut self.model, name);
    }

    pub fn subscribe(&mut self, mailbox: &str, subscribed: bool) {
        self.scheduler.add_task(
            &mut self.model,
            Box::new(SubscribeUnsubscribeTask::new(mailbox.to_owned(), subscribed)),
        );
    }

    pub fn copy_messages(&mut self, source: &str, target: &str, uids: Vec<u32>) {
        self.scheduler.add_task(
            &mut self.model,
            Box::new(CopyMessagesTask::new(
                source.to_owned(),
                target.to_owned(),
                uids,
            )),
        );
    }

    pub fn append(
        &mut self,
        mailbox: &str,
        flags: Vec<String>,
        internal_date: Option<DateTime<FixedOffset>>,
        message: Vec<u8>,
    ) {
        self.scheduler.add_task(
            &mut self.model,
            Box::new(AppendTask::new(
                mailbox.to_owned(),
                flags,
                internal_date,
                message,
            )),
        );
    }

    pub fn update_flags(
        &mut self,
        mailbox: &str,
        uids: Vec<u32>,
        action: StoreAction,
        flags: Vec<String>,
    ) {
        self.scheduler.add_task(
            &mut self.model,
            Box::new(UpdateFlagsTask::new(mailbox.to_owned(), uids, action, flags)),
        );
    }

    pub fn expunge_mailbox(&mut self, mailbox: &str) {
        self.scheduler.add_task(
            &mut self.model,
            Box::new(ExpungeMailboxTask::new(mailbox.to_owned())),
        );
    }

    pub fn search(&mut self, mailbox: NodeId, criteria: &str) {
        let task = SearchTask::new(&self.model, mailbox, SearchKind::Search, criteria.to_owned());
        self.scheduler.add_task(&mut self.model, Box::new(task));
    }

    pub fn sort(&mut self, mailbox: NodeId, sort_criteria: Vec<String>, search: &str) {
        let task = SearchTask::new(
            &self.model,
            mailbox,
            SearchKind::Sort {
                criteria: sort_criteria,
            },
            search.to_owned(),
        );
        self.scheduler.add_task(&mut self.model, Box::new(task));
    }

    pub fn thread(&mut self, mailbox: NodeId, algorithm: &str, search: &str) {
        let task = SearchTask::new(
            &self.model,
            mailbox,
            SearchKind::Thread {
                algorithm: algorithm.to_owned(),
            },
            search.to_owned(),
        );
        self.scheduler.add_task(&mut self.model, Box::new(task));
    }

    pub fn refresh_numbers(&mut self, mailbox: NodeId) {
        let task = NumberOfMessagesTask::new(&self.model, mailbox);
        self.scheduler.add_task(&mut self.model, Box::new(task));
    }

    pub fn genurlauth(&mut self, url: &str, mechanism: &str) {
        self.scheduler.add_task(
            &mut self.model,
            Box::new(GenUrlAuthTask::new(url.to_owned(), mechanism.to_owned())),
        );
    }

    // ----- model request plumbing -----

    fn drain_model_requests(&mut self) {
        for request in self.model.take_requests() {
            match request {
                ModelRequest::SyncMailbox(node) => {
                    if let Some(name) = self.model.mailbox_name_of(node) {
                        self.scheduler.request_select(&mut self.model, &name);
                    }
                }
                ModelRequest::ListChildren(node) => {
                    let task = ListChildMailboxesTask::new(node);
                    self.scheduler.add_task(&mut self.model, Box::new(task));
                }
                ModelRequest::FetchMessageMetadata(node) => {
                    let task = FetchMsgMetadataTask::new(&self.model, vec![node]);
                    self.scheduler.add_task(&mut self.model, Box::new(task));
                }
                ModelRequest::FetchPart(node) => {
                    if !self.pending_parts.contains(&node) {
                        self.pending_parts.push(node);
                    }
                    let window = self.model.config.delayed_fetch_part_ms;
                    if window == 0 {
                        self.flush_part_fetches();
                    } else if self.parts_flush_due_ms.is_none() {
                        self.parts_flush_due_ms = Some(self.now_ms + window);
                    }
                }
            }
        }
    }

    /// Emit the batched `BODY.PEEK` fetches collected during the window.
    pub fn flush_part_fetches(&mut self) {
        self.parts_flush_due_ms = None;
        if self.pending_parts.is_empty() {
            return;
        }

        // one task per mailbox, so each can ride its own selected state
        let mut per_mailbox: Vec<(String, Vec<NodeId>)> = Vec::new();
        for node in std::mem::take(&mut self.pending_parts) {
            let Some(name) = self.model.mailbox_name_of(node) else {
                continue;
            };
            match per_mailbox.iter_mut().find(|(n, _)| *n == name) {
                Some((_, nodes)) => nodes.push(node),
                None => per_mailbox.push((name, vec![node])),
            }
        }

        for (_, nodes) in per_mailbox {
            let task = FetchMsgPartTask::new(&self.model, nodes);
            self.scheduler.add_task(&mut self.model, Box::new(task));
        }
    }

    // ----- introspection -----

    pub fn selected_mailbox(&self) -> Option<&str> {
        self.scheduler.selected_mailbox()
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Push a connection-fatal error into the event stream (for embedders
    /// reporting TLS trouble and the like).
    pub fn report_transport_error(&mut self, error: &Error) {
        self.model.events.push(Event::Error {
            path: String::new(),
            short_message: String::from("Transport failure"),
            long_message: error.to_string(),
        });
    }
}
