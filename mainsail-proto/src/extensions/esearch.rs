//! ESEARCH (RFC 4731) and its CONTEXT=SEARCH (RFC 5267) incremental form.

use nom::bytes::streaming::tag;

use crate::{
    core::{astring, atom, eat_spaces, number, plist},
    decode::{ParseErrorKind, ProtoParseError, ProtoResult},
    extensions::{
        at_line_end,
        sort_thread::{insert_thread, ThreadNode},
    },
    sequence::{sequence_set, SequenceSet},
};

/// Whether an ADDTO/REMOVEFROM record adds or removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    AddTo,
    RemoveFrom,
}

/// One `(offset uid-set)` record of an ADDTO/REMOVEFROM group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextIncremental {
    pub kind: ContextKind,
    pub offset: u32,
    pub uids: Vec<u32>,
}

/// One `INCTHREAD previous-root (thread)*` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalThread {
    pub previous_root: u32,
    pub threads: Vec<ThreadNode>,
}

/// An `* ESEARCH` response.
///
/// `list_data` keeps the generic `label value` pairs (MIN, MAX, ALL,
/// COUNT, ...) in wire order; the CONTEXT=SEARCH specials get their own
/// typed storage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ESearch {
    /// Search correlator: the tag of the command this response belongs to.
    /// Tolerated missing, some servers forget it.
    pub tag: Option<String>,
    /// `UID` marker: values are UIDs rather than sequence numbers.
    pub uid: bool,
    pub list_data: Vec<(String, SequenceSet)>,
    pub incremental: Vec<ContextIncremental>,
    pub inc_thread: Vec<IncrementalThread>,
}

/// Parse the payload after `ESEARCH`.
pub fn esearch(input: &[u8]) -> ProtoResult<'_, ESearch> {
    let mut result = ESearch::default();

    let (mut remaining, _) = eat_spaces(input)?;

    // an empty ESEARCH response shall be OK
    if at_line_end(remaining) {
        return Ok((remaining, result));
    }

    // search-correlator: "(" "TAG" SP tag-string ")"
    if remaining.first() == Some(&b'(') {
        let (rest, _) = tag(b"(")(remaining)?;
        let (rest, header) = atom(rest)?;
        if !header.eq_ignore_ascii_case("TAG") {
            return Err(ProtoParseError::failure(
                remaining,
                ParseErrorKind::UnexpectedHere,
            ));
        }
        let (rest, _) = eat_spaces(rest)?;
        let (rest, (tag_value, _)) = astring(rest)?;
        let (rest, _) = tag(b")")(rest)?;

        result.tag = Some(String::from_utf8_lossy(&tag_value).into_owned());
        let (rest, _) = eat_spaces(rest)?;
        remaining = rest;
    }

    if at_line_end(remaining) {
        // correlator given but nothing else; accept
        return Ok((remaining, result));
    }

    // optional "UID" specifier
    if let Ok((rest, marker)) = atom(remaining) {
        if marker.eq_ignore_ascii_case("UID") {
            result.uid = true;
            let (rest, _) = eat_spaces(rest)?;
            remaining = rest;
        }
    }

    while !at_line_end(remaining) {
        let (rest, label) = atom(remaining)?;
        let label = label.to_ascii_uppercase();
        let (rest, _) = eat_spaces(rest)?;

        remaining = match label.as_str() {
            "ADDTO" | "REMOVEFROM" => {
                let kind = if label == "ADDTO" {
                    ContextKind::AddTo
                } else {
                    ContextKind::RemoveFrom
                };
                parse_incremental_group(rest, kind, &mut result.incremental)?
            }
            "INCTHREAD" => parse_inc_thread(rest, &mut result.inc_thread)?,
            _ => {
                let (rest, set) = sequence_set(rest)?;
                result.list_data.push((label, set));
                let (rest, _) = eat_spaces(rest)?;
                rest
            }
        };
    }

    Ok((remaining, result))
}

/// `"(" 1*(offset SP uid-set) ")"` — each group can carry many pairs.
fn parse_incremental_group<'a>(
    input: &'a [u8],
    kind: ContextKind,
    out: &mut Vec<ContextIncremental>,
) -> Result<&'a [u8], nom::Err<ProtoParseError<'a>>> {
    let (mut remaining, _) = tag(b"(")(input)?;

    loop {
        let (rest, _) = eat_spaces(remaining)?;
        remaining = rest;

        if remaining.first() == Some(&b')') {
            let (rest, _) = eat_spaces(&remaining[1..])?;
            return Ok(rest);
        }
        if at_line_end(remaining) {
            return Err(ProtoParseError::failure(remaining, ParseErrorKind::NoData));
        }

        let (rest, offset) = number(remaining)?;
        let (rest, _) = eat_spaces(rest)?;
        let (rest, set) = sequence_set(rest)?;

        let Some(uids) = set.expand_finite() else {
            return Err(ProtoParseError::failure(
                remaining,
                ParseErrorKind::UnexpectedHere,
            ));
        };

        out.push(ContextIncremental { kind, offset, uids });
        remaining = rest;
    }
}

/// `previous-root SP 1*(thread-list)`
fn parse_inc_thread<'a>(
    input: &'a [u8],
    out: &mut Vec<IncrementalThread>,
) -> Result<&'a [u8], nom::Err<ProtoParseError<'a>>> {
    let (remaining, previous_root) = number(input)?;
    let (mut remaining, _) = eat_spaces(remaining)?;

    let mut root = ThreadNode::default();
    while remaining.first() == Some(&b'(') {
        let (rest, items) = plist(remaining)?;
        insert_thread(&mut root, &items)
            .map_err(|()| ProtoParseError::failure(remaining, ParseErrorKind::UnexpectedHere))?;
        let (rest, _) = eat_spaces(rest)?;
        remaining = rest;
    }

    out.push(IncrementalThread {
        previous_root,
        threads: root.children,
    });

    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let (_, parsed) = esearch(b"\r\n").unwrap();
        assert_eq!(parsed, ESearch::default());
    }

    #[test]
    fn test_correlator_and_uid() {
        let (_, parsed) = esearch(b"(TAG \"A282\") UID MIN 2 COUNT 3\r\n").unwrap();
        assert_eq!(parsed.tag.as_deref(), Some("A282"));
        assert!(parsed.uid);
        assert_eq!(parsed.list_data.len(), 2);
        assert_eq!(parsed.list_data[0].0, "MIN");
        assert_eq!(parsed.list_data[0].1.expand_finite().unwrap(), vec![2]);
        assert_eq!(parsed.list_data[1].0, "COUNT");
    }

    #[test]
    fn test_all_sequence() {
        let (_, parsed) = esearch(b"(TAG \"A283\") ALL 2,10:11\r\n").unwrap();
        assert_eq!(parsed.list_data[0].0, "ALL");
        assert_eq!(
            parsed.list_data[0].1.expand_finite().unwrap(),
            vec![2, 10, 11]
        );
    }

    #[test]
    fn test_missing_correlator_tolerated() {
        let (_, parsed) = esearch(b"COUNT 17\r\n").unwrap();
        assert!(parsed.tag.is_none());
        assert_eq!(parsed.list_data[0].0, "COUNT");
    }

    #[test]
    fn test_addto_removefrom() {
        let (_, parsed) =
            esearch(b"(TAG \"B\") UID ADDTO (1 2000:2001) REMOVEFROM (3 1500)\r\n").unwrap();
        assert_eq!(parsed.incremental.len(), 2);
        assert_eq!(parsed.incremental[0].kind, ContextKind::AddTo);
        assert_eq!(parsed.incremental[0].offset, 1);
        assert_eq!(parsed.incremental[0].uids, vec![2000, 2001]);
        assert_eq!(parsed.incremental[1].kind, ContextKind::RemoveFrom);
        assert_eq!(parsed.incremental[1].uids, vec![1500]);
    }

    #[test]
    fn test_addto_many_pairs_in_one_group() {
        let (_, parsed) = esearch(b"ADDTO (1 100 4 200:201)\r\n").unwrap();
        assert_eq!(parsed.incremental.len(), 2);
        assert_eq!(parsed.incremental[0].offset, 1);
        assert_eq!(parsed.incremental[0].uids, vec![100]);
        assert_eq!(parsed.incremental[1].offset, 4);
        assert_eq!(parsed.incremental[1].uids, vec![200, 201]);
    }

    #[test]
    fn test_incthread() {
        let (_, parsed) = esearch(b"(TAG \"C\") UID INCTHREAD 330 (339 (381 382))\r\n").unwrap();
        assert_eq!(parsed.inc_thread.len(), 1);
        assert_eq!(parsed.inc_thread[0].previous_root, 330);
        assert_eq!(parsed.inc_thread[0].threads[0].num, 339);
    }

    #[test]
    fn test_malformed_correlator() {
        assert!(esearch(b"(GAT \"A282\") COUNT 2\r\n").is_err());
    }
}
