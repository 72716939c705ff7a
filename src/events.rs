//! Change notifications from the core to the view model.
//!
//! A bounded queue replaces ad-hoc signals: the core publishes, the view
//! consumes. When the consumer stalls long enough to fill the queue, the
//! oldest events are dropped with a warning; the view is expected to
//! re-query the model after that.

use std::collections::VecDeque;

use mainsail_proto::extensions::sort_thread::ThreadNode;

use crate::model::tree::NodeId;

/// One notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `count` children were inserted under `parent` starting at `first`.
    RowsInserted {
        parent: NodeId,
        first: usize,
        count: usize,
    },
    /// `count` children were removed from under `parent` starting at `first`.
    RowsRemoved {
        parent: NodeId,
        first: usize,
        count: usize,
    },
    /// The answers for this node's roles changed.
    DataChanged { node: NodeId },
    /// The connection state changed.
    Connection(ConnectionEvent),
    /// A server-side SEARCH or SORT finished.
    SearchCompleted { mailbox: NodeId, uids: Vec<u32> },
    /// A server-side THREAD finished.
    ThreadingCompleted {
        mailbox: NodeId,
        threads: Vec<ThreadNode>,
    },
    /// A task failed on behalf of a node.
    Error {
        /// Human-readable path of the node the failure belongs to
        /// (mailbox name, message UID, part id).
        path: String,
        short_message: String,
        long_message: String,
    },
}

/// Connection lifecycle, as the view wants to display it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connecting,
    Authenticated,
    Selected,
    Disconnected,
}

/// Bounded event queue.
#[derive(Debug)]
pub struct EventQueue {
    queue: VecDeque<Event>,
    capacity: usize,
    dropped: u64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(4096)
    }
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: Event) {
        if self.queue.len() == self.capacity {
            self.queue.pop_front();
            self.dropped += 1;
            if self.dropped.is_power_of_two() {
                log::warn!("event queue overflow, {} events dropped so far", self.dropped);
            }
        }
        self.queue.push_back(event);
    }

    /// Take everything queued so far.
    pub fn drain(&mut self) -> Vec<Event> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = EventQueue::with_capacity(2);
        queue.push(Event::DataChanged { node: NodeId(1) });
        queue.push(Event::DataChanged { node: NodeId(2) });
        queue.push(Event::DataChanged { node: NodeId(3) });

        let drained = queue.drain();
        assert_eq!(
            drained,
            vec![
                Event::DataChanged { node: NodeId(2) },
                Event::DataChanged { node: NodeId(3) },
            ]
        );
    }
}
