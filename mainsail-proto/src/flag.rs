//! Flag atoms: `\Seen`, `\*`, site-defined keywords.
//!
//! Flags are kept as plain strings at the protocol layer; case
//! normalization and interning happen in the client's flag store.

use nom::{
    bytes::streaming::tag,
    combinator::{map, opt},
    multi::separated_list0,
    sequence::delimited,
};

use crate::{
    core::{atom, eat_spaces},
    decode::ProtoResult,
};

/// `flag = "\" atom / atom`, plus the `\*` of `flag-perm`.
pub fn flag(input: &[u8]) -> ProtoResult<'_, String> {
    let (remaining, backslash) = opt(tag(b"\\"))(input)?;

    if backslash.is_some() {
        if remaining.first() == Some(&b'*') {
            return Ok((&remaining[1..], String::from("\\*")));
        }
        let (remaining, name) = atom(remaining)?;
        Ok((remaining, format!("\\{name}")))
    } else {
        map(atom, str::to_owned)(remaining)
    }
}

/// `flag-list = "(" [flag *(SP flag)] ")"`
pub fn flag_list(input: &[u8]) -> ProtoResult<'_, Vec<String>> {
    delimited(
        tag(b"("),
        delimited(eat_spaces, separated_list0(tag(b" "), flag), eat_spaces),
        tag(b")"),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag() {
        let (_, val) = flag(b"\\Seen ").unwrap();
        assert_eq!(val, "\\Seen");

        let (_, val) = flag(b"\\* ").unwrap();
        assert_eq!(val, "\\*");

        let (_, val) = flag(b"$Forwarded ").unwrap();
        assert_eq!(val, "$Forwarded");

        assert!(flag(b" x").is_err());
    }

    #[test]
    fn test_flag_list() {
        let (rem, val) = flag_list(b"(\\Seen \\Deleted custom) ").unwrap();
        assert_eq!(val, vec!["\\Seen", "\\Deleted", "custom"]);
        assert_eq!(rem, b" ");

        let (_, val) = flag_list(b"() ").unwrap();
        assert!(val.is_empty());
    }
}
