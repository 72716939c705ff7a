//! The classic torture-test message: a deeply nested MIME tree arriving as
//! one BODYSTRUCTURE, checked part id by part id.

use mainsail::{
    model::{
        metadata::MailboxMetadata,
        parts::{build_part_tree, part_by_section, special_of},
        tree::{NodeId, SpecialKind, Tree},
    },
    proto::body::body,
};

/// multipart/mixed
///   1 text/plain
///   2 message/rfc822 (body: text/plain -> 2.1)
///   3 message/rfc822 (body: multipart/alternative)
///     3.1 text/plain
///     3.2 multipart/parallel
///       3.2.1 image/gif
///       3.2.2 audio/basic
///     3.3 application/atomicmail
///   4 audio/basic
///   5 image/pgm
const TORTURE: &[u8] = b"(\
(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL \"Explanation\" \"7BIT\" 190 3)\
(\"MESSAGE\" \"RFC822\" NIL NIL \"Rich Text demo\" \"7BIT\" 4906 \
(NIL \"Rich Text demo\" NIL NIL NIL NIL NIL NIL NIL NIL) \
(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 767 16) \
106)\
(\"MESSAGE\" \"RFC822\" NIL NIL \"Alternative demo\" \"7BIT\" 8899 \
(NIL \"Alternative demo\" NIL NIL NIL NIL NIL NIL NIL NIL) \
(\
(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 767 16)\
(\
(\"IMAGE\" \"GIF\" NIL NIL NIL \"BASE64\" 4096)\
(\"AUDIO\" \"BASIC\" NIL NIL NIL \"BASE64\" 8192)\
 \"PARALLEL\" (\"BOUNDARY\" \"p\") NIL NIL)\
(\"APPLICATION\" \"ATOMICMAIL\" NIL NIL NIL \"7BIT\" 4452)\
 \"ALTERNATIVE\" (\"BOUNDARY\" \"a\") NIL NIL) \
186)\
(\"AUDIO\" \"BASIC\" NIL NIL \"Voice Mail demo\" \"BASE64\" 36234)\
(\"IMAGE\" \"PGM\" (\"NAME\" \"mailbox.pgm\") NIL \"Mail architecture slide\" \"BASE64\" 84638)\
 \"MIXED\" (\"BOUNDARY\" \"mixed\") NIL NIL)";

/// The inner multipart/parallel needs to be a real multipart, not a
/// message/rfc822 mislabeled; build a cleaner tree for the nested checks.
const NESTED_ALTERNATIVE: &[u8] = b"(\
(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 190 3)\
(\"MESSAGE\" \"RFC822\" NIL NIL NIL \"7BIT\" 8899 \
(NIL \"inner\" NIL NIL NIL NIL NIL NIL NIL NIL) \
(\
(\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 767 16)\
(\
(\"IMAGE\" \"GIF\" NIL NIL NIL \"BASE64\" 4096)\
(\"AUDIO\" \"BASIC\" NIL NIL NIL \"BASE64\" 8192)\
 \"PARALLEL\")\
(\"APPLICATION\" \"ATOMICMAIL\" NIL NIL NIL \"7BIT\" 4452)\
 \"ALTERNATIVE\")\
 186)\
(\"AUDIO\" \"BASIC\" NIL NIL NIL \"BASE64\" 36234)\
 \"MIXED\")";

fn build(wire: &[u8]) -> (Tree, NodeId) {
    let mut tree = Tree::new();
    let inbox = tree.create_mailbox(tree.root(), MailboxMetadata::new("INBOX", "/", vec![]));
    let list = tree.message_list_of(inbox);
    tree.append_placeholder_messages(list, 1);
    let message = tree.message_at(list, 0).unwrap();

    let mut line = wire.to_vec();
    line.push(b' ');
    let (_, structure) = body(&line).expect("torture bodystructure parses");
    build_part_tree(&mut tree, message, &structure);
    (tree, message)
}

fn mime_of(tree: &Tree, id: NodeId) -> String {
    tree.node(id).as_part().unwrap().mime_type.clone()
}

#[test]
fn torture_tree_shape() {
    let (tree, message) = build(TORTURE);

    // root: a top-level multipart with no id of its own
    let root = tree.node(message).children[0];
    let root_part = tree.node(root).as_part().unwrap();
    assert!(root_part.is_top_level_multipart);
    assert_eq!(root_part.mime_type, "multipart/mixed");
    assert_eq!(tree.part_id(root), "");
    assert_eq!(tree.node(root).children.len(), 5);

    let children = tree.node(root).children.clone();

    assert_eq!(mime_of(&tree, children[0]), "text/plain");
    assert_eq!(tree.part_id(children[0]), "1");

    assert_eq!(mime_of(&tree, children[1]), "message/rfc822");
    assert_eq!(tree.part_id(children[1]), "2");
    let embedded_body = tree.node(children[1]).children[0];
    assert_eq!(mime_of(&tree, embedded_body), "text/plain");
    assert_eq!(tree.part_id(embedded_body), "2.1");

    // the second embedded message hides a multipart/alternative
    assert_eq!(mime_of(&tree, children[2]), "message/rfc822");
    assert_eq!(tree.part_id(children[2]), "3");
    let alternative = tree.node(children[2]).children[0];
    assert!(tree.node(alternative).as_part().unwrap().is_top_level_multipart);
    let alt_children = tree.node(alternative).children.clone();
    assert_eq!(tree.part_id(alt_children[0]), "3.1");
    assert_eq!(mime_of(&tree, alt_children[1]), "multipart/parallel");
    assert_eq!(tree.part_id(alt_children[1]), "3.2");
    assert_eq!(
        tree.part_id(tree.node(alt_children[1]).children[0]),
        "3.2.1"
    );
    assert_eq!(
        tree.part_id(tree.node(alt_children[1]).children[1]),
        "3.2.2"
    );
    assert_eq!(mime_of(&tree, alt_children[2]), "application/atomicmail");
    assert_eq!(tree.part_id(alt_children[2]), "3.3");

    assert_eq!(mime_of(&tree, children[3]), "audio/basic");
    assert_eq!(tree.part_id(children[3]), "4");
    assert_eq!(mime_of(&tree, children[4]), "image/pgm");
    assert_eq!(tree.part_id(children[4]), "5");

    // filename from body-fld-param NAME
    assert_eq!(
        tree.node(children[4]).as_part().unwrap().filename.as_deref(),
        Some("mailbox.pgm")
    );
}

#[test]
fn torture_nested_message_with_alternative() {
    let (tree, message) = build(NESTED_ALTERNATIVE);

    let root = tree.node(message).children[0];
    let embedded = tree.node(root).children[1];
    assert_eq!(mime_of(&tree, embedded), "message/rfc822");
    assert_eq!(tree.part_id(embedded), "2");

    // its body is a multipart/alternative: top-level within the embedded
    // message, so no id of its own
    let alternative = tree.node(embedded).children[0];
    let alternative_part = tree.node(alternative).as_part().unwrap();
    assert!(alternative_part.is_top_level_multipart);
    assert_eq!(alternative_part.mime_type, "multipart/alternative");
    assert_eq!(tree.part_id(alternative), "");

    let alt_children = tree.node(alternative).children.clone();
    assert_eq!(tree.part_id(alt_children[0]), "2.1");
    assert_eq!(mime_of(&tree, alt_children[0]), "text/plain");

    // the nested multipart/parallel is a *regular* multipart: it has an id
    let parallel = alt_children[1];
    assert_eq!(mime_of(&tree, parallel), "multipart/parallel");
    assert!(!tree.node(parallel).as_part().unwrap().is_top_level_multipart);
    assert_eq!(tree.part_id(parallel), "2.2");

    let gif = tree.node(parallel).children[0];
    let basic = tree.node(parallel).children[1];
    assert_eq!(mime_of(&tree, gif), "image/gif");
    assert_eq!(tree.part_id(gif), "2.2.1");
    assert_eq!(mime_of(&tree, basic), "audio/basic");
    assert_eq!(tree.part_id(basic), "2.2.2");

    assert_eq!(mime_of(&tree, alt_children[2]), "application/atomicmail");
    assert_eq!(tree.part_id(alt_children[2]), "2.3");

    // section specifiers resolve back to the same nodes
    assert_eq!(part_by_section(&tree, message, "2.2.1"), Some(gif));
    assert_eq!(part_by_section(&tree, message, "2.3"), Some(alt_children[2]));
    assert_eq!(part_by_section(&tree, message, "2"), Some(embedded));

    // the embedded message exposes HEADER/TEXT pseudo-parts
    let header = special_of(&tree, embedded, SpecialKind::Header).unwrap();
    assert_eq!(tree.part_id(header), "2.HEADER");
    assert_eq!(part_by_section(&tree, message, "2.HEADER"), Some(header));
}

#[test]
fn torture_survives_session_round_trip() {
    // the same structure through the cache serialization used by the model
    use mainsail::model::parts::{deserialize_body_structure, serialize_body_structure};

    let mut line = NESTED_ALTERNATIVE.to_vec();
    line.push(b' ');
    let (_, structure) = body(&line).unwrap();

    let serialized = serialize_body_structure(&structure);
    let restored = deserialize_body_structure(&serialized).unwrap();
    assert_eq!(structure, restored);
}
