//! The small tasks: one command out, a handful of responses back.

use mainsail_proto::{
    command::CommandBody,
    response::{Response, SocketEvent, State, StateKind},
};

use crate::{
    error::Error,
    model::{tree::NodeId, Model},
    tasks::{Claim, Outgoing, Task, TaskOutcome},
};

/// Shared plumbing: one tagged command, Done on OK, Failed on NO/BAD.
struct TagTracker {
    tag: Option<String>,
    outcome: TaskOutcome,
    aborted: bool,
}

impl TagTracker {
    fn new() -> Self {
        Self {
            tag: None,
            outcome: TaskOutcome::Running,
            aborted: false,
        }
    }

    fn handle_completion(&mut self, response: &Response) -> Option<StateKind> {
        if let Response::Socket(SocketEvent::Disconnected { reason }) = response {
            self.outcome = TaskOutcome::Failed(Error::Disconnected(reason.clone()));
            return None;
        }

        let Response::State(State {
            tag: Some(tag),
            kind,
            text,
            ..
        }) = response
        else {
            return None;
        };
        if self.tag.as_deref() != Some(tag.as_str()) {
            return None;
        }

        self.tag = None;
        if self.aborted {
            self.outcome = TaskOutcome::Failed(Error::Aborted(String::from("task cancelled")));
        } else {
            match kind {
                StateKind::Ok => self.outcome = TaskOutcome::Done,
                kind => {
                    self.outcome = TaskOutcome::Failed(Error::Server {
                        kind: *kind,
                        text: text.clone(),
                    })
                }
            }
        }
        Some(*kind)
    }
}

// ----- CAPABILITY -----

pub struct CapabilityTask {
    tracker: TagTracker,
}

impl CapabilityTask {
    pub fn new() -> Self {
        Self {
            tracker: TagTracker::new(),
        }
    }
}

impl Default for CapabilityTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for CapabilityTask {
    fn name(&self) -> &'static str {
        "capability"
    }

    fn runs_before_authentication(&self) -> bool {
        true
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        self.tracker.tag = Some(out.emit(CommandBody::Capability));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        if let Response::Capability(caps) = response {
            model.set_capabilities(caps);
            return Claim::Claimed;
        }
        match self.tracker.handle_completion(response) {
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }
}

// ----- LOGIN -----

/// The scheduler watches for this task's completion to flip the connection
/// into the authenticated state.
pub struct LoginTask {
    user: String,
    password: String,
    tracker: TagTracker,
}

impl LoginTask {
    pub fn new(user: String, password: String) -> Self {
        Self {
            user,
            password,
            tracker: TagTracker::new(),
        }
    }
}

impl Task for LoginTask {
    fn name(&self) -> &'static str {
        "login"
    }

    fn runs_before_authentication(&self) -> bool {
        true
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        self.tracker.tag = Some(out.emit(CommandBody::Login {
            user: self.user.clone(),
            password: self.password.clone(),
        }));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        if self.tracker.tag.is_some() {
            // a CAPABILITY code on the tagged OK saves a round-trip
            if let Response::State(State {
                code: Some(mainsail_proto::response::RespCode::Capabilities(caps)),
                ..
            }) = response
            {
                model.set_capabilities(caps);
            }
        }
        match self.tracker.handle_completion(response) {
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }
}

// ----- ENABLE -----

pub struct EnableTask {
    extensions: Vec<String>,
    tracker: TagTracker,
}

impl EnableTask {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions,
            tracker: TagTracker::new(),
        }
    }
}

impl Task for EnableTask {
    fn name(&self) -> &'static str {
        "enable"
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        self.tracker.tag = Some(out.emit(CommandBody::Enable(self.extensions.clone())));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        if let Response::Enabled(enabled) = response {
            for extension in enabled {
                log::debug!("server enabled {extension}");
                model.note_enabled(extension);
            }
            return Claim::Claimed;
        }
        match self.tracker.handle_completion(response) {
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }
}

// ----- ID -----

pub struct IdTask {
    fields: Option<Vec<(String, String)>>,
    tracker: TagTracker,
}

impl IdTask {
    pub fn new(fields: Option<Vec<(String, String)>>) -> Self {
        Self {
            fields,
            tracker: TagTracker::new(),
        }
    }
}

impl Task for IdTask {
    fn name(&self) -> &'static str {
        "id"
    }

    fn runs_before_authentication(&self) -> bool {
        true
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        self.tracker.tag = Some(out.emit(CommandBody::Id(self.fields.clone())));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        if let Response::Id(fields) = response {
            model.server_id = fields.clone();
            return Claim::Claimed;
        }
        match self.tracker.handle_completion(response) {
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }
}

// ----- NAMESPACE -----

pub struct NamespaceTask {
    tracker: TagTracker,
}

impl NamespaceTask {
    pub fn new() -> Self {
        Self {
            tracker: TagTracker::new(),
        }
    }
}

impl Default for NamespaceTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for NamespaceTask {
    fn name(&self) -> &'static str {
        "namespace"
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        self.tracker.tag = Some(out.emit(CommandBody::Namespace));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        if let Response::Namespace(namespace) = response {
            model.namespace = Some(namespace.clone());
            return Claim::Claimed;
        }
        match self.tracker.handle_completion(response) {
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }
}

// ----- SUBSCRIBE / UNSUBSCRIBE -----

pub struct SubscribeUnsubscribeTask {
    mailbox: String,
    subscribe: bool,
    node: Option<NodeId>,
    tracker: TagTracker,
}

impl SubscribeUnsubscribeTask {
    pub fn new(mailbox: String, subscribe: bool) -> Self {
        Self {
            mailbox,
            subscribe,
            node: None,
            tracker: TagTracker::new(),
        }
    }
}

impl Task for SubscribeUnsubscribeTask {
    fn name(&self) -> &'static str {
        "subscribe-unsubscribe"
    }

    fn activate(&mut self, model: &mut Model, out: &mut Outgoing) {
        self.node = model.tree.find_mailbox(&self.mailbox);
        let body = if self.subscribe {
            CommandBody::Subscribe {
                mailbox: self.mailbox.clone(),
            }
        } else {
            CommandBody::Unsubscribe {
                mailbox: self.mailbox.clone(),
            }
        };
        self.tracker.tag = Some(out.emit(body));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        match self.tracker.handle_completion(response) {
            Some(StateKind::Ok) => {
                // reflect the new subscription state in the LIST flags
                if let Some(node) = self.node {
                    if let Some(mailbox) =
                        match &mut model.tree.node_mut(node).kind {
                            crate::model::tree::NodeKind::Mailbox(m) => Some(m),
                            _ => None,
                        }
                    {
                        let flags = &mut mailbox.metadata.flags;
                        flags.retain(|flag| !flag.eq_ignore_ascii_case("\\Subscribed"));
                        if self.subscribe {
                            flags.push(String::from("\\Subscribed"));
                        }
                    }
                    model.events.push(crate::events::Event::DataChanged { node });
                }
                Claim::Claimed
            }
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }

    fn target_node(&self) -> Option<NodeId> {
        self.node
    }
}

// ----- UID COPY -----

pub struct CopyMessagesTask {
    source: String,
    target: String,
    uids: Vec<u32>,
    tracker: TagTracker,
}

impl CopyMessagesTask {
    pub fn new(source: String, target: String, uids: Vec<u32>) -> Self {
        Self {
            source,
            target,
            uids,
            tracker: TagTracker::new(),
        }
    }
}

impl Task for CopyMessagesTask {
    fn name(&self) -> &'static str {
        "copy-messages"
    }

    fn required_mailbox(&self) -> Option<&str> {
        Some(&self.source)
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        let mut uids = self.uids.clone();
        uids.sort_unstable();
        uids.dedup();
        self.tracker.tag = Some(out.emit(CommandBody::Copy {
            uid: true,
            sequence: mainsail_proto::sequence::SequenceSet::from_sorted(&uids),
            mailbox: self.target.clone(),
        }));
    }

    fn handle(&mut self, _model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        if self.tracker.tag.is_some() {
            if let Response::State(State {
                code: Some(mainsail_proto::response::RespCode::CopyUid { .. }),
                tag: Some(_),
                ..
            }) = response
            {
                // the target mailbox will learn the new UIDs on its next
                // sync; nothing to patch here
            }
        }
        match self.tracker.handle_completion(response) {
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }
}

// ----- EXPUNGE -----

pub struct ExpungeMailboxTask {
    mailbox: String,
    tracker: TagTracker,
}

impl ExpungeMailboxTask {
    pub fn new(mailbox: String) -> Self {
        Self {
            mailbox,
            tracker: TagTracker::new(),
        }
    }
}

impl Task for ExpungeMailboxTask {
    fn name(&self) -> &'static str {
        "expunge-mailbox"
    }

    fn required_mailbox(&self) -> Option<&str> {
        Some(&self.mailbox)
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        // the untagged EXPUNGE storm is the maintainer's to apply
        self.tracker.tag = Some(out.emit(CommandBody::Expunge));
    }

    fn handle(&mut self, _model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        match self.tracker.handle_completion(response) {
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }
}

// ----- APPEND -----

pub struct AppendTask {
    mailbox: String,
    flags: Vec<String>,
    internal_date: Option<chrono::DateTime<chrono::FixedOffset>>,
    message: Vec<u8>,
    tracker: TagTracker,
}

impl AppendTask {
    pub fn new(
        mailbox: String,
        flags: Vec<String>,
        internal_date: Option<chrono::DateTime<chrono::FixedOffset>>,
        message: Vec<u8>,
    ) -> Self {
        Self {
            mailbox,
            flags,
            internal_date,
            message,
            tracker: TagTracker::new(),
        }
    }
}

impl Task for AppendTask {
    fn name(&self) -> &'static str {
        "append"
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        self.tracker.tag = Some(out.emit(CommandBody::Append {
            mailbox: self.mailbox.clone(),
            flags: self.flags.clone(),
            internal_date: self.internal_date,
            message: self.message.clone(),
        }));
    }

    fn handle(&mut self, _model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        if self.tracker.tag.is_some() {
            if let Response::State(State {
                tag: Some(_),
                code:
                    Some(mainsail_proto::response::RespCode::AppendUid {
                        uid_validity,
                        uids,
                    }),
                ..
            }) = response
            {
                // MULTIAPPEND assigns one UID per message, in order; with a
                // single message a longer set is a server bug
                match uids.expand_finite() {
                    Some(expanded) if expanded.len() == 1 => log::debug!(
                        "APPEND to {} got UID {} (UIDVALIDITY {uid_validity})",
                        self.mailbox,
                        expanded[0]
                    ),
                    _ => log::warn!(
                        "APPEND to {}: APPENDUID does not match the number of appended messages",
                        self.mailbox
                    ),
                }
            }
        }
        match self.tracker.handle_completion(response) {
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }
}

// ----- GENURLAUTH -----

pub struct GenUrlAuthTask {
    url: String,
    mechanism: String,
    tracker: TagTracker,
}

impl GenUrlAuthTask {
    pub fn new(url: String, mechanism: String) -> Self {
        Self {
            url,
            mechanism,
            tracker: TagTracker::new(),
        }
    }
}

impl Task for GenUrlAuthTask {
    fn name(&self) -> &'static str {
        "genurlauth"
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        self.tracker.tag = Some(out.emit(CommandBody::GenUrlAuth {
            url: self.url.clone(),
            mechanism: self.mechanism.clone(),
        }));
    }

    fn handle(&mut self, model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        if let Response::GenUrlAuth(url) = response {
            model.genurlauth = Some(url.clone());
            return Claim::Claimed;
        }
        match self.tracker.handle_completion(response) {
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }
}

// ----- LOGOUT -----

pub struct LogoutTask {
    tracker: TagTracker,
}

impl LogoutTask {
    pub fn new() -> Self {
        Self {
            tracker: TagTracker::new(),
        }
    }
}

impl Default for LogoutTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for LogoutTask {
    fn name(&self) -> &'static str {
        "logout"
    }

    fn runs_before_authentication(&self) -> bool {
        true
    }

    fn activate(&mut self, _model: &mut Model, out: &mut Outgoing) {
        self.tracker.tag = Some(out.emit(CommandBody::Logout));
    }

    fn handle(&mut self, _model: &mut Model, _out: &mut Outgoing, response: &Response) -> Claim {
        if let Response::State(State {
            tag: None,
            kind: StateKind::Bye,
            ..
        }) = response
        {
            // expected on the way out; the scheduler sees it too
            return Claim::NotMine;
        }
        match self.tracker.handle_completion(response) {
            Some(_) => Claim::Claimed,
            None => Claim::NotMine,
        }
    }

    fn outcome(&self) -> TaskOutcome {
        self.tracker.outcome.clone()
    }

    fn abort(&mut self, _reason: &str) {
        self.tracker.aborted = true;
    }
}
