//! Building the Part tree out of a parsed BODYSTRUCTURE.

use mainsail_proto::body::{BasicFields, BodyStructure, ParamList};

use crate::model::tree::{NodeId, NodeKind, PartNode, SpecialKind, Tree};

/// The byte encoding the cache stores BODYSTRUCTUREs in.
pub fn serialize_body_structure(structure: &BodyStructure) -> Vec<u8> {
    serde_json::to_vec(structure).expect("BodyStructure serializes")
}

pub fn deserialize_body_structure(bytes: &[u8]) -> Option<BodyStructure> {
    serde_json::from_slice(bytes).ok()
}

/// Case-insensitive parameter lookup with RFC 2231 decoding: handles both
/// the `name*0*`/`name*1` continuation form and the one-shot
/// `name*=charset''value` form, falling back to the plain parameter.
pub fn rfc2231_param(params: &ParamList, name: &str) -> Option<String> {
    // continuations first
    let mut chunks: Vec<(u32, bool, &str)> = Vec::new();
    for (key, value) in params {
        let key = key.to_ascii_lowercase();
        let Some(rest) = key.strip_prefix(&format!("{}*", name.to_ascii_lowercase())) else {
            continue;
        };
        if rest.is_empty() {
            // "name*=charset'lang'encoded"
            return Some(decode_rfc2231_value(value, true));
        }
        let (digits, encoded) = match rest.strip_suffix('*') {
            Some(digits) => (digits, true),
            None => (rest, false),
        };
        if let Ok(index) = digits.parse::<u32>() {
            chunks.push((index, encoded, value));
        }
    }

    if !chunks.is_empty() {
        chunks.sort_by_key(|&(index, _, _)| index);
        let mut out = String::new();
        for (i, (_, encoded, value)) in chunks.iter().enumerate() {
            // only the first chunk carries the charset prefix
            out.push_str(&decode_rfc2231_value(value, *encoded && i == 0));
        }
        return Some(out);
    }

    params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

fn decode_rfc2231_value(value: &str, with_charset_prefix: bool) -> String {
    let payload = if with_charset_prefix {
        // charset'language'percent-encoded
        let mut pieces = value.splitn(3, '\'');
        let _charset = pieces.next();
        let _language = pieces.next();
        match pieces.next() {
            Some(rest) => rest,
            None => value,
        }
    } else {
        value
    };

    let mut bytes = Vec::with_capacity(payload.len());
    let mut iter = payload.bytes();
    while let Some(byte) = iter.next() {
        if byte == b'%' {
            let hi = iter.next().and_then(hex_digit);
            let lo = iter.next().and_then(hex_digit);
            match (hi, lo) {
                (Some(hi), Some(lo)) => bytes.push(hi << 4 | lo),
                _ => bytes.push(b'%'),
            }
        } else {
            bytes.push(byte);
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn part_node_from_fields(fields: &BasicFields, ext_disposition: Option<&(String, ParamList)>) -> PartNode {
    let mut part = PartNode {
        mime_type: fields.mime_type(),
        charset: fields.param("charset").map(str::to_owned),
        content_format: fields.param("format").map(str::to_owned),
        content_delsp: fields.param("delsp").map(str::to_owned),
        transfer_encoding: fields.transfer_encoding.clone(),
        body_fld_id: fields.body_fld_id.clone(),
        octets: fields.octets,
        body_fld_param: fields.params.clone(),
        ..PartNode::default()
    };

    if let Some((kind, params)) = ext_disposition {
        part.body_disposition = Some(kind.clone());
        part.filename = rfc2231_param(params, "filename");
    }
    if part.filename.is_none() {
        part.filename = rfc2231_param(&fields.params, "name");
    }

    part
}

fn disposition_of(structure: &BodyStructure) -> Option<(String, ParamList)> {
    let ext = match structure {
        BodyStructure::Text { ext, .. }
        | BodyStructure::Basic { ext, .. }
        | BodyStructure::Message { ext, .. }
        | BodyStructure::Multipart { ext, .. } => ext,
    };
    ext.disposition
        .as_ref()
        .map(|dsp| (dsp.kind.clone(), dsp.params.clone()))
}

/// Attach the full Part tree for `structure` under `message`, including
/// the special pseudo-part columns. Any previous part tree is expected to
/// be gone already.
pub fn build_part_tree(tree: &mut Tree, message: NodeId, structure: &BodyStructure) {
    // message-level HEADER/TEXT pseudo-parts
    for kind in [SpecialKind::Header, SpecialKind::Text] {
        let special = PartNode {
            special: Some(kind),
            ..PartNode::default()
        };
        tree.create_special_part(message, special);
    }

    build_node(tree, message, structure, true);
}

/// `parent_is_message`: the parent is either the Message node itself or a
/// message/rfc822 part, which makes a multipart child a "top-level"
/// multipart without a part id of its own.
fn build_node(tree: &mut Tree, parent: NodeId, structure: &BodyStructure, parent_is_message: bool) {
    match structure {
        BodyStructure::Multipart {
            parts,
            media_subtype,
            params,
            ..
        } => {
            let node = PartNode {
                mime_type: format!("multipart/{media_subtype}"),
                body_fld_param: params.clone(),
                multipart_related_main_cid: rfc2231_param(params, "start"),
                is_top_level_multipart: parent_is_message,
                ..part_defaults_from_disposition(structure)
            };
            let id = tree.create_part(parent, node);
            if !parent_is_message {
                attach_specials(tree, id, false);
            }
            for sub in parts {
                build_node(tree, id, sub, false);
            }
        }
        BodyStructure::Message {
            fields,
            envelope: _,
            body,
            ..
        } => {
            let node = part_node_from_fields(fields, disposition_of(structure).as_ref());
            let id = tree.create_part(parent, node);
            attach_specials(tree, id, true);
            build_node(tree, id, body, true);
        }
        BodyStructure::Text { fields, .. } | BodyStructure::Basic { fields, .. } => {
            let node = part_node_from_fields(fields, disposition_of(structure).as_ref());
            let id = tree.create_part(parent, node);
            attach_specials(tree, id, false);
        }
    }
}

fn part_defaults_from_disposition(structure: &BodyStructure) -> PartNode {
    let mut part = PartNode::default();
    if let Some((kind, params)) = disposition_of(structure) {
        part.filename = rfc2231_param(&params, "filename");
        part.body_disposition = Some(kind);
    }
    part
}

/// MIME and RAW for every real part; HEADER and TEXT additionally for
/// embedded messages.
fn attach_specials(tree: &mut Tree, part: NodeId, is_embedded_message: bool) {
    let mime = tree.node(part).as_part().map(|p| p.mime_type.clone()).unwrap_or_default();

    let mut kinds = vec![SpecialKind::Mime, SpecialKind::Raw];
    if is_embedded_message {
        kinds.insert(0, SpecialKind::Text);
        kinds.insert(0, SpecialKind::Header);
    }

    for kind in kinds {
        let special = PartNode {
            mime_type: mime.clone(),
            special: Some(kind),
            ..PartNode::default()
        };
        tree.create_special_part(part, special);
    }
}

/// Resolve a FETCH section specifier (`1.2`, `2.HEADER`, `HEADER`, ...)
/// to the node it addresses, starting from a message.
pub fn part_by_section(tree: &Tree, message: NodeId, section: &str) -> Option<NodeId> {
    let mut current = message;

    if section.is_empty() {
        return Some(message);
    }

    for segment in section.split('.') {
        if let Ok(number) = segment.parse::<usize>() {
            if number == 0 {
                return None;
            }
            current = descend_through_multipart(tree, current)?;
            current = tree.node(current).children.get(number - 1).copied()?;
        } else {
            let wanted = match segment.to_ascii_uppercase().as_str() {
                "HEADER" => SpecialKind::Header,
                "TEXT" => SpecialKind::Text,
                "MIME" => SpecialKind::Mime,
                _ => return None,
            };
            current = special_of(tree, current, wanted)?;
        }
    }

    Some(current)
}

/// Message nodes and message/rfc822 parts hold their children behind a
/// top-level multipart when there is one; numeric segments address
/// through it.
fn descend_through_multipart(tree: &Tree, id: NodeId) -> Option<NodeId> {
    let node = tree.node(id);
    let is_message_like = match &node.kind {
        NodeKind::Message(_) => true,
        NodeKind::Part(part) => part.mime_type.starts_with("message/"),
        _ => false,
    };
    if !is_message_like {
        return Some(id);
    }

    match node.children.first() {
        Some(&first)
            if tree
                .node(first)
                .as_part()
                .is_some_and(|part| part.is_top_level_multipart) =>
        {
            Some(first)
        }
        _ => Some(id),
    }
}

/// A node's special column of the given kind.
pub fn special_of(tree: &Tree, id: NodeId, kind: SpecialKind) -> Option<NodeId> {
    let specials: &[NodeId] = match &tree.node(id).kind {
        NodeKind::Message(message) => &message.specials,
        NodeKind::Part(part) => &part.specials,
        _ => return None,
    };
    specials
        .iter()
        .copied()
        .find(|&s| tree.node(s).as_part().and_then(|p| p.special) == Some(kind))
}

#[cfg(test)]
mod tests {
    use mainsail_proto::body::body;

    use crate::model::{metadata::MailboxMetadata, tree::Tree};

    use super::*;

    fn message_with_structure(wire: &[u8]) -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let inbox = tree.create_mailbox(
            tree.root(),
            MailboxMetadata::new("INBOX", "/", vec![]),
        );
        let list = tree.message_list_of(inbox);
        tree.append_placeholder_messages(list, 1);
        let message = tree.message_at(list, 0).unwrap();

        let mut line = wire.to_vec();
        line.push(b' ');
        let (_, parsed) = body(&line).unwrap();
        build_part_tree(&mut tree, message, &parsed);
        (tree, message)
    }

    #[test]
    fn test_single_part_message() {
        let (tree, message) = message_with_structure(
            b"(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\") NIL NIL \"QUOTED-PRINTABLE\" 1024 20)",
        );

        let part = tree.node(message).children[0];
        let node = tree.node(part).as_part().unwrap();
        assert_eq!(node.mime_type, "text/plain");
        assert_eq!(node.charset.as_deref(), Some("utf-8"));
        assert!(!node.is_top_level_multipart);
        assert_eq!(tree.part_id(part), "1");
        assert_eq!(tree.path_to_part(part), "/0");

        // MIME + RAW specials exist; RAW is addressed by the parent's id
        let mime = special_of(&tree, part, SpecialKind::Mime).unwrap();
        assert_eq!(tree.part_id(mime), "1.MIME");
        let raw = special_of(&tree, part, SpecialKind::Raw).unwrap();
        assert_eq!(tree.part_id(raw), "1");
    }

    #[test]
    fn test_top_level_multipart_has_no_id() {
        let (tree, message) = message_with_structure(
            b"((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1)(\"TEXT\" \"HTML\" NIL NIL NIL \"7BIT\" 20 1) \"ALTERNATIVE\")",
        );

        let multipart = tree.node(message).children[0];
        let node = tree.node(multipart).as_part().unwrap();
        assert!(node.is_top_level_multipart);
        assert_eq!(node.mime_type, "multipart/alternative");
        assert_eq!(tree.part_id(multipart), "");

        let first = tree.node(multipart).children[0];
        let second = tree.node(multipart).children[1];
        assert_eq!(tree.part_id(first), "1");
        assert_eq!(tree.part_id(second), "2");
    }

    #[test]
    fn test_embedded_message_numbering() {
        // multipart/mixed with text/plain and message/rfc822(text/plain)
        let (tree, message) = message_with_structure(
            b"((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1)(\"MESSAGE\" \"RFC822\" NIL NIL NIL \"7BIT\" 320 (NIL \"inner\" NIL NIL NIL NIL NIL NIL NIL NIL) (\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1) 12) \"MIXED\")",
        );

        let multipart = tree.node(message).children[0];
        let embedded = tree.node(multipart).children[1];
        assert_eq!(tree.part_id(embedded), "2");
        assert_eq!(
            tree.node(embedded).as_part().unwrap().mime_type,
            "message/rfc822"
        );

        let inner = tree.node(embedded).children[0];
        assert_eq!(tree.part_id(inner), "2.1");

        // embedded messages get all four specials
        let header = special_of(&tree, embedded, SpecialKind::Header).unwrap();
        assert_eq!(tree.part_id(header), "2.HEADER");

        // section resolution goes the other way
        assert_eq!(
            part_by_section(&tree, message, "2.1"),
            Some(inner)
        );
        assert_eq!(part_by_section(&tree, message, "2"), Some(embedded));
        assert_eq!(part_by_section(&tree, message, "2.HEADER"), Some(header));
    }

    #[test]
    fn test_nested_message_multipart() {
        // message/rfc822 whose body is multipart/alternative: children of
        // the inner multipart are numbered under the message part's id
        let (tree, message) = message_with_structure(
            b"((\"MESSAGE\" \"RFC822\" NIL NIL NIL \"7BIT\" 320 (NIL \"inner\" NIL NIL NIL NIL NIL NIL NIL NIL) ((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1)(\"TEXT\" \"RICHTEXT\" NIL NIL NIL \"7BIT\" 20 1) \"ALTERNATIVE\") 12) \"MIXED\")",
        );

        let outer_multipart = tree.node(message).children[0];
        let embedded = tree.node(outer_multipart).children[0];
        assert_eq!(tree.part_id(embedded), "1");

        let inner_multipart = tree.node(embedded).children[0];
        let inner = tree.node(inner_multipart).as_part().unwrap();
        assert!(inner.is_top_level_multipart);
        assert_eq!(tree.part_id(inner_multipart), "");

        let plain = tree.node(inner_multipart).children[0];
        let rich = tree.node(inner_multipart).children[1];
        assert_eq!(tree.part_id(plain), "1.1");
        assert_eq!(tree.part_id(rich), "1.2");

        assert_eq!(part_by_section(&tree, message, "1.2"), Some(rich));
    }

    #[test]
    fn test_message_level_header_special() {
        let (tree, message) = message_with_structure(
            b"(\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1)",
        );
        let header = special_of(&tree, message, SpecialKind::Header).unwrap();
        assert_eq!(tree.part_id(header), "HEADER");
        assert_eq!(part_by_section(&tree, message, "HEADER"), Some(header));
    }

    #[test]
    fn test_rfc2231_filename() {
        // plain
        let params = vec![("FILENAME".to_string(), "a.pdf".to_string())];
        assert_eq!(rfc2231_param(&params, "filename").as_deref(), Some("a.pdf"));

        // one-shot encoded
        let params = vec![(
            "filename*".to_string(),
            "UTF-8''%C3%BCml%C3%A4ut.pdf".to_string(),
        )];
        assert_eq!(
            rfc2231_param(&params, "filename").as_deref(),
            Some("\u{fc}ml\u{e4}ut.pdf")
        );

        // continuations
        let params = vec![
            ("filename*1".to_string(), "half.pdf".to_string()),
            ("filename*0*".to_string(), "UTF-8''first%20".to_string()),
        ];
        assert_eq!(
            rfc2231_param(&params, "filename").as_deref(),
            Some("first half.pdf")
        );
    }
}
