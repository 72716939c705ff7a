//! The ENVELOPE structure and its parser.

use std::fmt::{Display, Formatter};

use abnf_core::streaming::sp;
use chrono::{DateTime, FixedOffset};
use nom::{
    branch::alt,
    bytes::streaming::tag,
    combinator::map,
    multi::many1,
    sequence::{delimited, preceded, tuple},
};
use serde::{Deserialize, Serialize};

use crate::{
    core::{eat_spaces, nil, nstring},
    datetime::rfc2822_date_time,
    decode::ProtoResult,
    rfc5322,
};

/// One RFC 2822 address as IMAP models it: a 4-tuple of display name,
/// source route, local part, and host.
///
/// Display names may carry RFC 2047 encoded words; decoding those is the
/// MIME layer's business, not ours.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub name: Option<String>,
    pub adl: Option<String>,
    pub mailbox: Option<String>,
    pub host: Option<String>,
}

impl Address {
    pub fn new(
        name: Option<&str>,
        adl: Option<&str>,
        mailbox: Option<&str>,
        host: Option<&str>,
    ) -> Self {
        Self {
            name: name.map(str::to_owned),
            adl: adl.map(str::to_owned),
            mailbox: mailbox.map(str::to_owned),
            host: host.map(str::to_owned),
        }
    }

    /// `local@host`, or as much of it as is known.
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(mailbox), Some(host)) => Some(format!("{mailbox}@{host}")),
            (Some(mailbox), None) => Some(mailbox.clone()),
            _ => None,
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.name, self.email()) {
            (Some(name), Some(email)) => write!(f, "{name} <{email}>"),
            (Some(name), None) => write!(f, "{name}"),
            (None, Some(email)) => write!(f, "{email}"),
            (None, None) => Ok(()),
        }
    }
}

/// The envelope of a message: what `FETCH (ENVELOPE)` returns, minus the
/// wire representation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub date: Option<DateTime<FixedOffset>>,
    pub subject: Option<String>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    /// Message-ids from the `In-Reply-To` header content.
    pub in_reply_to: Vec<String>,
    pub message_id: Option<String>,
}

/// ```abnf
/// address = "(" addr-name SP addr-adl SP addr-mailbox SP addr-host ")"
/// ```
fn address(input: &[u8]) -> ProtoResult<'_, Address> {
    let mut parser = delimited(
        tag(b"("),
        tuple((nstring, sp, nstring, sp, nstring, sp, nstring)),
        tag(b")"),
    );

    let (remaining, (name, _, adl, _, mailbox, _, host)) = parser(input)?;

    let text = |v: Option<Vec<u8>>| v.map(|b| String::from_utf8_lossy(&b).into_owned());

    Ok((
        remaining,
        Address {
            name: text(name),
            adl: text(adl),
            mailbox: text(mailbox),
            host: text(host),
        },
    ))
}

/// `env-from = "(" 1*address ")" / nil` (and the five siblings)
///
/// Some servers put spaces between the addresses; that is tolerated.
fn address_list(input: &[u8]) -> ProtoResult<'_, Vec<Address>> {
    alt((
        map(nil, |_| Vec::new()),
        delimited(
            tag(b"("),
            many1(preceded(eat_spaces, address)),
            preceded(eat_spaces, tag(b")")),
        ),
    ))(input)
}

/// ```abnf
/// envelope = "(" env-date SP env-subject SP env-from SP env-sender SP
///            env-reply-to SP env-to SP env-cc SP env-bcc SP
///            env-in-reply-to SP env-message-id ")"
/// ```
pub fn envelope(input: &[u8]) -> ProtoResult<'_, Envelope> {
    let mut parser = delimited(
        tag(b"("),
        tuple((
            nstring, // date
            sp,
            nstring, // subject
            sp,
            address_list, // from
            sp,
            address_list, // sender
            sp,
            address_list, // reply-to
            sp,
            address_list, // to
            sp,
            address_list, // cc
            sp,
            address_list, // bcc
            sp,
            nstring, // in-reply-to
            sp,
            nstring, // message-id
        )),
        tag(b")"),
    );

    let (
        remaining,
        (date, _, subject, _, from, _, sender, _, reply_to, _, to, _, cc, _, bcc, _, in_reply_to, _, message_id),
    ) = parser(input)?;

    let date = date.and_then(|raw| {
        let mut line = raw.clone();
        line.extend_from_slice(b"\r\n");
        match rfc2822_date_time(&line) {
            Ok((_, parsed)) => Some(parsed),
            Err(_) => {
                log::debug!(
                    "envelope: unparsable date {:?}",
                    String::from_utf8_lossy(&raw)
                );
                None
            }
        }
    });

    let in_reply_to = in_reply_to
        .map(|raw| rfc5322::parse_message_ids(&raw))
        .unwrap_or_default();

    let message_id = message_id
        .and_then(|raw| rfc5322::parse_message_ids(&raw).into_iter().next());

    Ok((
        remaining,
        Envelope {
            date,
            subject: subject.map(|b| String::from_utf8_lossy(&b).into_owned()),
            from,
            sender,
            reply_to,
            to,
            cc,
            bcc,
            in_reply_to,
            message_id,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRE: &[u8] = b"(\"Fri, 21 Nov 1997 09:55:06 -0600\" \"hello\" ((\"Fred Foobar\" NIL \"foobar\" \"Blurdybloop.COM\")) NIL NIL ((NIL NIL \"mooch\" \"owatagu.siam.edu\")) NIL NIL \"<oldmsg@x>\" \"<B27397-0100000@Blurdybloop.COM>\")x";

    #[test]
    fn test_envelope() {
        let (rem, env) = envelope(WIRE).unwrap();
        assert_eq!(rem, b"x");

        assert_eq!(
            env.date.unwrap().to_rfc3339(),
            "1997-11-21T09:55:06-06:00"
        );
        assert_eq!(env.subject.as_deref(), Some("hello"));
        assert_eq!(
            env.from,
            vec![Address::new(
                Some("Fred Foobar"),
                None,
                Some("foobar"),
                Some("Blurdybloop.COM")
            )]
        );
        assert!(env.sender.is_empty());
        assert_eq!(env.to[0].email().as_deref(), Some("mooch@owatagu.siam.edu"));
        assert_eq!(env.in_reply_to, vec!["oldmsg@x"]);
        assert_eq!(
            env.message_id.as_deref(),
            Some("B27397-0100000@Blurdybloop.COM")
        );
    }

    #[test]
    fn test_envelope_sloppy_address_spacing() {
        let wire = b"(NIL NIL ((NIL NIL \"a\" \"x\") (NIL NIL \"b\" \"y\")) NIL NIL NIL NIL NIL NIL NIL)x";
        let (_, env) = envelope(wire).unwrap();
        assert_eq!(env.from.len(), 2);
    }

    #[test]
    fn test_address_display() {
        let addr = Address::new(Some("Jan Novak"), None, Some("jan"), Some("example.org"));
        assert_eq!(addr.to_string(), "Jan Novak <jan@example.org>");

        let addr = Address::new(None, None, Some("jan"), Some("example.org"));
        assert_eq!(addr.to_string(), "jan@example.org");
    }
}
