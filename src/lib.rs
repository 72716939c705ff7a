//! mainsail — an IMAP4rev1 client core.
//!
//! The crate is the engine room of a mail client: it keeps an in-memory
//! mailbox/message/MIME tree, reconciles it with the server through a
//! cooperative task scheduler, and persists reconcilable state through a
//! pluggable [`cache::Cache`].
//!
//! It is sans-I/O: the embedder owns the socket. Feed received bytes into
//! [`session::Session::feed`], ship the bytes from
//! [`session::Session::take_wire_output`], call
//! [`session::Session::tick`] from a timer, and consume change
//! notifications from [`session::Session::take_events`]. Everything else —
//! selection, synchronization, lazy fetching — happens behind the model's
//! query interface.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod session;
pub mod tasks;

mod find;

pub use mainsail_proto as proto;
