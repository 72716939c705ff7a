//! End-to-end synchronization scenarios: scripted server responses in,
//! exact wire bytes out, cache state checked afterwards.

use mainsail::{
    cache::{Cache, MemoryCache},
    config::Config,
    model::roles::{Role, Value},
    model::tree::{FetchState, NodeId},
    session::Session,
};

fn session_with_cache(cache: MemoryCache) -> Session {
    let mut config = Config::default();
    config.delayed_fetch_part_ms = 0;
    let mut session = Session::new(Box::new(cache), config);

    session.socket_connected();
    session.feed(b"* OK [CAPABILITY IMAP4rev1] server ready\r\n");
    session.login("jan", "pass");
    assert_eq!(session.take_wire_output(), b"y0 LOGIN jan pass\r\n");
    session.feed(b"y0 OK logged in\r\n");
    session
}

fn wire(session: &mut Session) -> String {
    String::from_utf8(session.take_wire_output()).unwrap()
}

fn inbox(session: &Session) -> NodeId {
    session.model.tree.find_mailbox("INBOX").unwrap()
}

fn list_of_inbox(session: &Session) -> NodeId {
    let mailbox = inbox(session);
    session.model.tree.message_list_of(mailbox)
}

#[test]
fn scenario_a_sync_empty_mailbox_minimally() {
    let mut session = session_with_cache(MemoryCache::new());

    session.select_mailbox("INBOX");
    assert_eq!(wire(&mut session), "y1 SELECT INBOX\r\n");

    session.feed(b"* 0 EXISTS\r\n* 0 RECENT\r\ny1 OK [READ-WRITE] selected\r\n");

    // no further commands
    assert_eq!(wire(&mut session), "");

    let list = list_of_inbox(&session);
    assert_eq!(session.model.tree.node(list).fetch_state, FetchState::Done);

    let state = session.model.cache.mailbox_sync_state("INBOX");
    assert!(state.has_exists());
    assert_eq!(state.exists(), 0);
    assert!(!state.is_usable_for_syncing());
    assert!(session.model.cache.uid_mapping("INBOX").is_empty());

    // leaving and re-entering accepts the same minimal reply without error
    session.select_mailbox("Other");
    assert_eq!(wire(&mut session), "y2 CLOSE\r\n");
    session.feed(b"y2 OK closed\r\n");
    assert_eq!(wire(&mut session), "y3 SELECT Other\r\n");
    session.feed(b"* 0 EXISTS\r\ny3 OK selected\r\n");
    assert_eq!(wire(&mut session), "");

    session.select_mailbox("INBOX");
    assert_eq!(wire(&mut session), "y4 CLOSE\r\n");
    session.feed(b"y4 OK closed\r\n");
    assert_eq!(wire(&mut session), "y5 SELECT INBOX\r\n");
    session.feed(b"* 0 EXISTS\r\ny5 OK selected\r\n");
    assert_eq!(wire(&mut session), "");

    let errors: Vec<_> = session
        .take_events()
        .into_iter()
        .filter(|event| matches!(event, mainsail::events::Event::Error { .. }))
        .collect();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn scenario_b_first_time_sync() {
    let mut session = session_with_cache(MemoryCache::new());

    session.select_mailbox("INBOX");
    assert_eq!(wire(&mut session), "y1 SELECT INBOX\r\n");

    session.feed(
        b"* 3 EXISTS\r\n* 0 RECENT\r\n* OK [UIDVALIDITY 666] x\r\n* OK [UIDNEXT 15] x\r\ny1 OK [READ-WRITE] selected\r\n",
    );
    assert_eq!(wire(&mut session), "y2 UID SEARCH ALL\r\n");

    session.feed(b"* SEARCH 6 9 10\r\ny2 OK search done\r\n");
    assert_eq!(wire(&mut session), "y3 FETCH 1:3 (FLAGS)\r\n");

    session.feed(
        b"* 1 FETCH (FLAGS (\\Seen))\r\n* 2 FETCH (FLAGS ())\r\n* 3 FETCH (FLAGS (\\Seen custom))\r\ny3 OK done\r\n",
    );
    assert_eq!(wire(&mut session), "");

    // cache: 3-long UID map, flags for all three, consistent sync state
    assert_eq!(session.model.cache.uid_mapping("INBOX"), vec![6, 9, 10]);
    let state = session.model.cache.mailbox_sync_state("INBOX");
    assert_eq!(state.exists(), 3);
    assert_eq!(state.uid_validity(), 666);
    assert_eq!(state.uid_next(), 15);
    assert!(state.is_usable_for_syncing());

    assert_eq!(
        session.model.cache.message_metadata("INBOX", 6).flags,
        vec!["\\Seen"]
    );
    assert!(session.model.cache.message_metadata("INBOX", 9).flags.is_empty());
    assert_eq!(
        session.model.cache.message_metadata("INBOX", 10).flags,
        vec!["\\Seen", "custom"]
    );

    // the list reports three children, all with known UIDs
    let list = list_of_inbox(&session);
    assert_eq!(session.model.tree.node(list).children.len(), 3);
    assert_eq!(session.model.tree.uid_map(list), vec![6, 9, 10]);
    assert_eq!(session.model.tree.node(list).fetch_state, FetchState::Done);
}

#[test]
fn scenario_c_reentry_with_new_arrival() {
    let mut cache = MemoryCache::new();
    {
        use mainsail::model::sync_state::SyncState;
        let mut state = SyncState::default();
        state.set_exists(3);
        state.set_uid_next(15);
        state.set_uid_validity(666);
        cache.set_mailbox_sync_state("INBOX", &state);
        cache.set_uid_mapping("INBOX", &[6, 9, 10]);
    }

    let mut session = session_with_cache(cache);
    session.select_mailbox("INBOX");
    assert_eq!(wire(&mut session), "y1 SELECT INBOX\r\n");

    session.feed(
        b"* 4 EXISTS\r\n* OK [UIDVALIDITY 666] x\r\n* OK [UIDNEXT 16] x\r\ny1 OK selected\r\n",
    );
    assert_eq!(wire(&mut session), "y2 UID SEARCH UID 15:*\r\n");

    session.feed(b"* SEARCH 42\r\ny2 OK done\r\n");
    assert_eq!(wire(&mut session), "y3 FETCH 1:4 (FLAGS)\r\n");

    session.feed(
        b"* 1 FETCH (FLAGS ())\r\n* 2 FETCH (FLAGS ())\r\n* 3 FETCH (FLAGS ())\r\n* 4 FETCH (FLAGS (\\Recent))\r\ny3 OK done\r\n",
    );
    assert_eq!(wire(&mut session), "");

    assert_eq!(session.model.cache.uid_mapping("INBOX"), vec![6, 9, 10, 42]);
    let state = session.model.cache.mailbox_sync_state("INBOX");
    assert_eq!(state.exists(), 4);
    // the new arrival pushed UIDNEXT past what the server claimed
    assert_eq!(state.uid_next(), 43);

    for uid in [6, 9, 10, 42] {
        assert_eq!(session.model.cache.message_metadata("INBOX", uid).uid, uid);
    }
}

#[test]
fn scenario_d_uidvalidity_changed() {
    let mut cache = MemoryCache::new();
    {
        use mainsail::model::sync_state::SyncState;
        let mut state = SyncState::default();
        state.set_exists(3);
        state.set_uid_next(15);
        state.set_uid_validity(333);
        cache.set_mailbox_sync_state("INBOX", &state);
        cache.set_uid_mapping("INBOX", &[6, 9, 10]);
        cache.set_msg_envelope("INBOX", 6, &Default::default());
        cache.set_msg_part("INBOX", 6, "1", b"old bytes");
        cache.set_msg_flags("INBOX", 9, &["\\Seen".into()]);
    }

    let mut session = session_with_cache(cache);
    session.select_mailbox("INBOX");
    assert_eq!(wire(&mut session), "y1 SELECT INBOX\r\n");

    session.feed(
        b"* 2 EXISTS\r\n* OK [UIDVALIDITY 666] x\r\n* OK [UIDNEXT 3] x\r\ny1 OK selected\r\n",
    );

    // cached message data is gone before any FETCH went out
    assert_eq!(session.model.cache.message_metadata("INBOX", 6).uid, 0);
    assert!(session.model.cache.message_part("INBOX", 6, "1").is_none());
    assert!(session.model.cache.message_metadata("INBOX", 9).flags.is_empty());

    // and the wire looks like a first-time sync
    assert_eq!(wire(&mut session), "y2 UID SEARCH ALL\r\n");
    session.feed(b"* SEARCH 1 2\r\ny2 OK done\r\n");
    assert_eq!(wire(&mut session), "y3 FETCH 1:2 (FLAGS)\r\n");
    session.feed(b"* 1 FETCH (FLAGS ())\r\n* 2 FETCH (FLAGS ())\r\ny3 OK done\r\n");

    assert_eq!(session.model.cache.uid_mapping("INBOX"), vec![1, 2]);
    let state = session.model.cache.mailbox_sync_state("INBOX");
    assert_eq!(state.uid_validity(), 666);
}

#[test]
fn scenario_e_expunge_interleaved_with_uid_search() {
    let mut cache = MemoryCache::new();
    {
        use mainsail::model::sync_state::SyncState;
        let mut state = SyncState::default();
        state.set_exists(6);
        state.set_uid_next(15);
        state.set_uid_validity(666);
        cache.set_mailbox_sync_state("INBOX", &state);
        cache.set_uid_mapping("INBOX", &[6, 9, 10, 11, 12, 14]);
        for uid in [6, 9, 10, 11, 12, 14] {
            cache.set_msg_flags("INBOX", uid, &["\\Seen".into()]);
        }
    }

    let mut session = session_with_cache(cache);
    session.select_mailbox("INBOX");
    assert_eq!(wire(&mut session), "y1 SELECT INBOX\r\n");

    session.feed(
        b"* 5 EXISTS\r\n* OK [UIDVALIDITY 666] x\r\n* OK [UIDNEXT 15] x\r\ny1 OK selected\r\n",
    );
    assert_eq!(wire(&mut session), "y2 UID SEARCH ALL\r\n");

    // the expunge lands while the search is in flight; our stale numbering
    // points it at UID 11
    session.feed(b"* 4 EXPUNGE\r\n");
    {
        let list = list_of_inbox(&session);
        assert_eq!(session.model.tree.uid_map(list), vec![6, 9, 10, 12, 14]);
    }

    session.feed(b"* SEARCH 6 10 11 14\r\ny2 OK done\r\n");
    assert_eq!(wire(&mut session), "y3 FETCH 1:4 (FLAGS)\r\n");

    session.feed(
        b"* 1 FETCH (FLAGS (\\Seen))\r\n* 2 FETCH (FLAGS (\\Seen))\r\n* 3 FETCH (FLAGS (\\Seen))\r\n* 4 FETCH (FLAGS (\\Seen))\r\ny3 OK done\r\n",
    );

    // the search result is authoritative: 11 is back, 9 and 12 are gone
    assert_eq!(session.model.cache.uid_mapping("INBOX"), vec![6, 10, 11, 14]);
    {
        let list = list_of_inbox(&session);
        assert_eq!(session.model.tree.uid_map(list), vec![6, 10, 11, 14]);
    }

    // cached flags cleared exactly for the messages that truly vanished
    assert!(session.model.cache.message_metadata("INBOX", 9).flags.is_empty());
    assert!(session.model.cache.message_metadata("INBOX", 12).flags.is_empty());
    assert_eq!(
        session.model.cache.message_metadata("INBOX", 11).flags,
        vec!["\\Seen"]
    );
}

#[test]
fn exists_bump_between_select_and_search_completion() {
    let mut session = session_with_cache(MemoryCache::new());

    session.select_mailbox("INBOX");
    assert_eq!(wire(&mut session), "y1 SELECT INBOX\r\n");
    session.feed(
        b"* 2 EXISTS\r\n* OK [UIDVALIDITY 666] x\r\n* OK [UIDNEXT 20] x\r\ny1 OK selected\r\n",
    );
    assert_eq!(wire(&mut session), "y2 UID SEARCH ALL\r\n");

    // one more message shows up while the search runs
    session.feed(b"* 3 EXISTS\r\n");
    session.feed(b"* SEARCH 11 15\r\ny2 OK done\r\n");

    // the extra arrival is swept by UID after the search, then flags
    let out = wire(&mut session);
    assert_eq!(out, "y3 UID FETCH 16:* (FLAGS)\r\ny4 FETCH 1:3 (FLAGS)\r\n");

    session.feed(b"* 3 FETCH (UID 21 FLAGS (\\Recent))\r\ny3 OK done\r\n");
    session.feed(b"* 1 FETCH (FLAGS ())\r\n* 2 FETCH (FLAGS ())\r\ny4 OK done\r\n");

    assert_eq!(session.model.cache.uid_mapping("INBOX"), vec![11, 15, 21]);
    let state = session.model.cache.mailbox_sync_state("INBOX");
    assert_eq!(state.exists(), 3);
    assert_eq!(state.uid_next(), 22);
}

#[test]
fn vanished_is_applied_by_uid() {
    let mut cache = MemoryCache::new();
    {
        use mainsail::model::sync_state::SyncState;
        let mut state = SyncState::default();
        state.set_exists(3);
        state.set_uid_next(15);
        state.set_uid_validity(666);
        cache.set_mailbox_sync_state("INBOX", &state);
        cache.set_uid_mapping("INBOX", &[6, 9, 10]);
    }

    let mut session = session_with_cache(cache);
    session.select_mailbox("INBOX");
    wire(&mut session);
    session.feed(
        b"* 3 EXISTS\r\n* OK [UIDVALIDITY 666] x\r\n* OK [UIDNEXT 15] x\r\ny1 OK selected\r\n",
    );
    wire(&mut session);
    session.feed(b"* 1 FETCH (FLAGS ())\r\n* 2 FETCH (FLAGS ())\r\n* 3 FETCH (FLAGS ())\r\ny2 OK done\r\n");
    assert_eq!(session.model.cache.uid_mapping("INBOX"), vec![6, 9, 10]);

    // QRESYNC-style removal in the selected state
    session.feed(b"* VANISHED 9\r\n");

    let list = list_of_inbox(&session);
    assert_eq!(session.model.tree.uid_map(list), vec![6, 10]);
    assert_eq!(session.model.cache.uid_mapping("INBOX"), vec![6, 10]);
    assert_eq!(session.model.cache.mailbox_sync_state("INBOX").exists(), 2);
}

#[test]
fn cached_part_needs_no_command() {
    let mut session = session_with_cache(MemoryCache::new());

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

    // the body structure arrives unsolicited; the part tree exists now
    session.feed(
        b"* 1 FETCH (UID 6 BODYSTRUCTURE (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\") NIL NIL \"7BIT\" 5 1))\r\n",
    );
    assert_eq!(wire(&mut session), "");

    let list = list_of_inbox(&session);
    let message = session.model.tree.message_at(list, 0).unwrap();
    let part = session.model.tree.node(message).children[0];

    // plant the payload in the cache, then ask for it
    {
        session.model.cache.set_msg_part("INBOX", 6, "1", b"hello");
    }
    let value = session.data(part, Role::PartData);
    assert_eq!(value, Value::Bytes(b"hello".to_vec()));
    assert_eq!(session.data(part, Role::IsFetched), Value::Bool(true));

    // the lowered fetch: nothing went to the wire
    assert_eq!(wire(&mut session), "");
}

#[test]
fn part_fetch_goes_through_transfer_decoding_path() {
    let mut session = session_with_cache(MemoryCache::new());

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
    session.feed(
        b"* 1 FETCH (UID 6 BODYSTRUCTURE (\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 5 1))\r\n",
    );
    wire(&mut session);

    let list = list_of_inbox(&session);
    let message = session.model.tree.message_at(list, 0).unwrap();
    let part = session.model.tree.node(message).children[0];

    // nothing cached: the query turns into BODY.PEEK
    let value = session.data(part, Role::PartData);
    assert_eq!(value, Value::None);
    assert_eq!(wire(&mut session), "y4 UID FETCH 6 (BODY.PEEK[1])\r\n");

    session.feed(b"* 1 FETCH (UID 6 BODY[1] {5}\r\nhello)\r\ny4 OK done\r\n");

    let value = session.data(part, Role::PartData);
    assert_eq!(value, Value::Bytes(b"hello".to_vec()));
    {
        assert_eq!(
            session.model.cache.message_part("INBOX", 6, "1").unwrap(),
            b"hello"
        );
    }
}

#[test]
fn select_denied_marks_mailbox_unavailable() {
    let mut session = session_with_cache(MemoryCache::new());

    session.select_mailbox("Secret");
    assert_eq!(wire(&mut session), "y1 SELECT Secret\r\n");
    session.feed(b"y1 NO permission denied\r\n");

    let mailbox = session.model.tree.find_mailbox("Secret").unwrap();
    let list = session.model.tree.message_list_of(mailbox);
    assert_eq!(
        session.model.tree.node(list).fetch_state,
        FetchState::Unavailable
    );

    // nothing was written for it
    assert!(!session.model.cache.mailbox_sync_state("Secret").has_exists());

    let errors: Vec<_> = session
        .take_events()
        .into_iter()
        .filter(|event| matches!(event, mainsail::events::Event::Error { .. }))
        .collect();
    assert!(!errors.is_empty());
}

#[test]
fn search_failure_forces_full_resync_next_time() {
    let mut cache = MemoryCache::new();
    {
        use mainsail::model::sync_state::SyncState;
        let mut state = SyncState::default();
        state.set_exists(2);
        state.set_uid_next(10);
        state.set_uid_validity(666);
        cache.set_mailbox_sync_state("INBOX", &state);
        cache.set_uid_mapping("INBOX", &[4, 7]);
    }

    let mut session = session_with_cache(cache);
    session.select_mailbox("INBOX");
    wire(&mut session);
    session.feed(
        b"* 3 EXISTS\r\n* OK [UIDVALIDITY 666] x\r\n* OK [UIDNEXT 11] x\r\ny1 OK selected\r\n",
    );
    assert_eq!(wire(&mut session), "y2 UID SEARCH UID 10:*\r\n");

    session.feed(b"y2 NO search refused\r\n");
    // failure: the cache was not touched
    {
        assert_eq!(session.model.cache.uid_mapping("INBOX"), vec![4, 7]);
    }

    // ... but the next attempt goes the full way
    session.select_mailbox("INBOX");
    assert_eq!(wire(&mut session), "y3 SELECT INBOX\r\n");
    session.feed(
        b"* 3 EXISTS\r\n* OK [UIDVALIDITY 666] x\r\n* OK [UIDNEXT 11] x\r\ny3 OK selected\r\n",
    );
    assert_eq!(wire(&mut session), "y4 UID SEARCH ALL\r\n");
}
