//! Connection lifecycle, mailbox listing, lazy loading, keepalive.

use mainsail::{
    cache::{Cache, MemoryCache},
    config::Config,
    model::roles::{Role, Value},
    session::Session,
};

fn wire(session: &mut Session) -> String {
    String::from_utf8(session.take_wire_output()).unwrap()
}

fn fresh_session() -> Session {
    let mut config = Config::default();
    config.delayed_fetch_part_ms = 0;
    let mut session = Session::new(Box::new(MemoryCache::new()), config);
    session.socket_connected();
    session.feed(b"* OK [CAPABILITY IMAP4rev1 IDLE UNSELECT] ready\r\n");
    session.login("jan", "pass");
    assert_eq!(wire(&mut session), "y0 LOGIN jan pass\r\n");
    session.feed(b"y0 OK welcome\r\n");
    session
}

#[test]
fn preauth_greeting_skips_login() {
    let mut session = Session::new(Box::new(MemoryCache::new()), Config::default());
    session.socket_connected();
    session.feed(b"* PREAUTH ready when you are\r\n");

    session.select_mailbox("INBOX");
    assert_eq!(wire(&mut session), "y0 SELECT INBOX\r\n");
}

#[test]
fn listing_children_from_the_wire_and_then_from_cache() {
    let mut session = fresh_session();
    let root = session.root();

    // first ask: nothing cached, a LIST goes out
    let count = session.row_count(root);
    assert_eq!(count, 1); // just the (empty) message list slot
    assert_eq!(wire(&mut session), "y1 LIST \"\" %\r\n");

    session.feed(
        b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n* LIST (\\HasChildren) \"/\" Archive\r\n* LIST (\\Noselect) \"/\" Shared\r\ny1 OK listed\r\n",
    );

    assert_eq!(session.row_count(root), 4);
    let inbox = session.model.tree.find_mailbox("INBOX").unwrap();
    assert_eq!(
        session.data(inbox, Role::MailboxIsINBOX),
        Value::Bool(true)
    );
    assert_eq!(
        session.data(inbox, Role::MailboxHasChildMailboxes),
        Value::Bool(false)
    );
    let shared = session.model.tree.find_mailbox("Shared").unwrap();
    assert_eq!(
        session.data(shared, Role::MailboxIsSelectable),
        Value::Bool(false)
    );

    // the cache has it now; a second session asks no questions
    assert!(session.model.cache.child_mailboxes_fresh(""));
    assert_eq!(session.model.cache.child_mailboxes("").len(), 3);
}

#[test]
fn message_metadata_loads_lazily() {
    let mut session = fresh_session();

    session.select_mailbox("INBOX");
    wire(&mut session);
    session.feed(
        b"* 1 EXISTS\r\n* OK [UIDVALIDITY 666] x\r\n* OK [UIDNEXT 7] x\r\ny1 OK selected\r\n",
    );
    wire(&mut session);
    session.feed(b"* SEARCH 6\r\ny2 OK done\r\n");
    wire(&mut session);
    session.feed(b"* 1 FETCH (FLAGS ())\r\ny3 OK done\r\n");
    wire(&mut session);

    let inbox = session.model.tree.find_mailbox("INBOX").unwrap();
    let list = session.model.tree.message_list_of(inbox);
    let message = session.model.tree.message_at(list, 0).unwrap();

    // asking for the subject queues a metadata fetch
    assert_eq!(session.data(message, Role::MessageSubject), Value::None);
    assert_eq!(
        wire(&mut session),
        "y4 UID FETCH 6 (UID FLAGS ENVELOPE INTERNALDATE RFC822.SIZE BODYSTRUCTURE BODY.PEEK[HEADER.FIELDS (References List-Post)])\r\n"
    );

    session.feed(
        b"* 1 FETCH (UID 6 FLAGS (\\Seen) RFC822.SIZE 1337 INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" ENVELOPE (\"Fri, 21 Nov 1997 09:55:06 -0600\" \"the subject\" ((\"A\" NIL \"a\" \"x.example\")) NIL NIL NIL NIL NIL NIL \"<mid@x>\") BODYSTRUCTURE (\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1) BODY[HEADER.FIELDS (REFERENCES LIST-POST)] {44}\r\nReferences: <r1@x> <r2@x>\r\nList-Post: NO\r\n\r\n)\r\ny4 OK done\r\n",
    );

    assert_eq!(
        session.data(message, Role::MessageSubject),
        Value::Str("the subject".into())
    );
    assert_eq!(session.data(message, Role::MessageSize), Value::U32(1337));
    assert_eq!(
        session.data(message, Role::MessageHeaderReferences),
        Value::StrList(vec!["r1@x".into(), "r2@x".into()])
    );
    assert_eq!(
        session.data(message, Role::MessageHeaderListPostNo),
        Value::Bool(true)
    );
    assert_eq!(
        session.data(message, Role::MessageIsMarkedRead),
        Value::Bool(true)
    );
    // the sticky bit keeps what the first flag fetch saw
    assert_eq!(
        session.data(message, Role::MessageWasUnread),
        Value::Bool(true)
    );
    assert_eq!(session.data(message, Role::MessageUid), Value::U32(6));

    // the envelope and structure are cached for the next session
    let bundle = session.model.cache.message_metadata("INBOX", 6);
    assert_eq!(bundle.uid, 6);
    assert_eq!(bundle.envelope.subject.as_deref(), Some("the subject"));
    assert_eq!(bundle.size, 1337);
    assert!(!bundle.serialized_body_structure.is_empty());
}

#[test]
fn idle_keepalive_breaks_cleanly() {
    let mut session = fresh_session();

    session.select_mailbox("INBOX");
    wire(&mut session);
    session.feed(b"* 0 EXISTS\r\ny1 OK selected\r\n");
    wire(&mut session);

    // the keepalive window elapses: IDLE goes out
    session.tick(1_000);
    assert_eq!(wire(&mut session), "");
    session.tick(1_000 + session.model.config.noop_period_ms + 1);
    assert_eq!(wire(&mut session), "y2 IDLE\r\n");
    session.feed(b"+ idling\r\n");

    // new work arrives: DONE must precede the next command
    session.update_flags(
        "INBOX",
        vec![6],
        mainsail::proto::command::StoreAction::Add,
        vec!["\\Seen".into()],
    );
    let out = wire(&mut session);
    assert!(out.starts_with("DONE\r\n"), "got: {out}");
    assert!(out.contains("UID STORE 6 +FLAGS.SILENT (\\Seen)"));

    session.feed(b"y2 OK idle finished\r\n");
}

#[test]
fn append_waits_for_continuation() {
    let mut session = fresh_session();

    session.append(
        "INBOX",
        vec!["\\Seen".into()],
        None,
        b"From: x\r\n\r\nhi\r\n".to_vec(),
    );

    // only the announcement goes out until the server says go
    assert_eq!(wire(&mut session), "y1 APPEND INBOX (\\Seen) {15}\r\n");
    session.feed(b"+ Ready for literal data\r\n");
    assert_eq!(wire(&mut session), "From: x\r\n\r\nhi\r\n\r\n");

    session.feed(b"y1 OK [APPENDUID 38505 3955] done\r\n");
    assert!(session.is_idle());
}

#[test]
fn status_refreshes_counters_without_selecting() {
    let mut session = fresh_session();
    let root = session.root();
    session.row_count(root);
    wire(&mut session);
    session.feed(b"* LIST () \"/\" Archive\r\ny1 OK listed\r\n");

    let archive = session.model.tree.find_mailbox("Archive").unwrap();
    session.refresh_numbers(archive);
    assert_eq!(
        wire(&mut session),
        "y2 STATUS Archive (MESSAGES UNSEEN RECENT)\r\n"
    );

    session.feed(b"* STATUS Archive (MESSAGES 231 UNSEEN 3 RECENT 1)\r\ny2 OK status\r\n");

    assert_eq!(
        session.data(archive, Role::TotalMessageCount),
        Value::U32(231)
    );
    assert_eq!(
        session.data(archive, Role::UnreadMessageCount),
        Value::U32(3)
    );
    assert_eq!(
        session.data(archive, Role::MailboxNumbersFetched),
        Value::Bool(true)
    );
}

#[test]
fn disconnect_fails_everything_loudly() {
    let mut session = fresh_session();

    session.select_mailbox("INBOX");
    wire(&mut session);

    session.socket_disconnected("connection reset by peer");

    let events = session.take_events();
    let disconnected = events.iter().any(|event| {
        matches!(
            event,
            mainsail::events::Event::Connection(
                mainsail::events::ConnectionEvent::Disconnected
            )
        )
    });
    let error = events
        .iter()
        .any(|event| matches!(event, mainsail::events::Event::Error { .. }));
    assert!(disconnected);
    assert!(error);

    // the session does not try to talk to a dead socket
    assert_eq!(wire(&mut session), "");
}
