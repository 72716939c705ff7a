//! SORT and THREAD (RFC 5256) untagged responses.

use crate::{
    core::{eat_spaces, number, plist, Any},
    decode::{ParseErrorKind, ProtoParseError, ProtoResult},
    extensions::at_line_end,
};

/// One node of a THREAD response tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadNode {
    /// Sequence number or UID; 0 for a synthetic root whose children share
    /// no known parent.
    pub num: u32,
    pub children: Vec<ThreadNode>,
}

/// `* SORT 2 84 882` — numbers until end of line.
pub fn sort_numbers(input: &[u8]) -> ProtoResult<'_, Vec<u32>> {
    let mut numbers = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = eat_spaces(remaining)?;
        remaining = rest;
        if at_line_end(remaining) {
            return Ok((remaining, numbers));
        }

        let (rest, n) = number(remaining)?;
        numbers.push(n);
        remaining = rest;
    }
}

/// `* THREAD (2)(3 6 (4 23)(44 7 96))`
///
/// The RFC 5256 syntax is counter-intuitive: items at the *same* level of a
/// list are parent/child, not siblings. The first element of each list is
/// the root of that subthread; a leading nested list means the subthread
/// root is unknown.
pub fn thread_response(input: &[u8]) -> ProtoResult<'_, Vec<ThreadNode>> {
    let mut root = ThreadNode::default();
    let mut remaining = input;

    loop {
        let (rest, _) = eat_spaces(remaining)?;
        remaining = rest;
        if at_line_end(remaining) {
            return Ok((remaining, root.children));
        }

        let (rest, items) = plist(remaining)?;
        insert_thread(&mut root, &items)
            .map_err(|()| ProtoParseError::failure(remaining, ParseErrorKind::UnexpectedHere))?;
        remaining = rest;
    }
}

pub(crate) fn insert_thread(node: &mut ThreadNode, items: &[Any]) -> Result<(), ()> {
    let mut current = node;
    let mut first = true;

    for item in items {
        match item {
            Any::Num(n) => {
                current.children.push(ThreadNode {
                    num: *n,
                    children: Vec::new(),
                });
                let moved = current;
                current = moved.children.last_mut().expect("just pushed");
            }
            Any::List(list) => {
                if first {
                    current.children.push(ThreadNode::default());
                    let moved = current;
                    current = moved.children.last_mut().expect("just pushed");
                }
                insert_thread(current, list)?;
            }
            _ => return Err(()),
        }
        first = false;
    }

    Ok(())
}
