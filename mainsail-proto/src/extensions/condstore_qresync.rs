//! QRESYNC (RFC 7162): the `VANISHED` untagged response.

use nom::{
    bytes::streaming::tag_no_case,
    combinator::opt,
    sequence::terminated,
};

use crate::{
    core::eat_spaces,
    decode::{ParseErrorKind, ProtoParseError, ProtoResult},
    sequence::sequence_set,
};

/// `* VANISHED [(EARLIER)] known-uids`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vanished {
    /// `(EARLIER)`: messages that vanished while we were not looking, as
    /// opposed to an expunge happening right now.
    pub earlier: bool,
    /// The expanded UID set, in wire order.
    pub uids: Vec<u32>,
}

/// Parse the payload after `VANISHED `.
pub fn vanished(input: &[u8]) -> ProtoResult<'_, Vanished> {
    let (input, _) = eat_spaces(input)?;
    let (input, earlier) = opt(terminated(tag_no_case(b"(EARLIER)"), eat_spaces))(input)?;

    let (remaining, uids) = sequence_set(input)?;

    let Some(uids) = uids.expand_finite() else {
        // '*' makes no sense in a VANISHED set
        return Err(ProtoParseError::failure(
            input,
            ParseErrorKind::UnexpectedHere,
        ));
    };

    Ok((
        remaining,
        Vanished {
            earlier: earlier.is_some(),
            uids,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vanished() {
        let (_, parsed) = vanished(b"300:310,405,411\r\n").unwrap();
        assert!(!parsed.earlier);
        assert_eq!(parsed.uids.len(), 13);
        assert_eq!(parsed.uids[0], 300);
        assert_eq!(parsed.uids[12], 411);
    }

    #[test]
    fn test_vanished_earlier() {
        let (_, parsed) = vanished(b"(EARLIER) 41,43:45\r\n").unwrap();
        assert!(parsed.earlier);
        assert_eq!(parsed.uids, vec![41, 43, 44, 45]);
    }

    #[test]
    fn test_vanished_star_rejected() {
        assert!(vanished(b"4:*\r\n").is_err());
    }
}
