//! Wire-level IMAP4rev1 support for the mainsail client core.
//!
//! This crate is sans-I/O: it turns byte slices into typed protocol values
//! and typed commands into wire bytes, and nothing else. The expected flow
//! on the receiving side is
//!
//! 1. feed raw socket bytes into a [`frames::FrameAssembler`],
//! 2. hand each complete frame to [`response::parse_response`],
//! 3. act on the returned [`response::Response`].
//!
//! On the sending side, build a [`command::Command`] and serialize it with
//! [`command::Command::write_to`].
//!
//! Note that IMAP traces are not guaranteed to be UTF-8; values that may
//! legally carry arbitrary octets are kept as `Vec<u8>`.

pub mod body;
pub mod command;
pub mod core;
pub mod datetime;
pub mod envelope;
pub mod extensions;
pub mod fetch;
pub mod flag;
pub mod frames;
pub mod response;
pub mod rfc5322;
pub mod sequence;

mod decode;

pub use decode::ParseErrorKind;
