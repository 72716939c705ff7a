//! ID (RFC 2971): server/client implementation identification.

use crate::{
    core::{nstring, plist, Any},
    decode::{ParseErrorKind, ProtoParseError, ProtoResult},
};

/// Parse the payload after `ID `: `NIL` or a parenthesized list of
/// key/value pairs. Values may be `NIL`.
pub fn id_response(input: &[u8]) -> ProtoResult<'_, Option<Vec<(String, String)>>> {
    if input.first() == Some(&b'(') {
        let (remaining, items) = plist(input)?;

        if items.len() % 2 != 0 {
            return Err(ProtoParseError::failure(
                input,
                ParseErrorKind::UnexpectedHere,
            ));
        }

        let pairs = items
            .chunks(2)
            .map(|pair| match pair {
                [key, value] => (key.to_text(), text_or_empty(value)),
                _ => unreachable!("chunks(2) of an even-length slice"),
            })
            .collect();

        return Ok((remaining, Some(pairs)));
    }

    // must be a NIL, then
    let (remaining, value) = nstring(input)?;
    if value.is_none() {
        Ok((remaining, None))
    } else {
        Err(ProtoParseError::failure(
            input,
            ParseErrorKind::UnexpectedHere,
        ))
    }
}

fn text_or_empty(value: &Any) -> String {
    match value {
        Any::Nil => String::new(),
        other => other.to_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_nil() {
        let (_, parsed) = id_response(b"NIL\r\n").unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn test_id_pairs() {
        let (_, parsed) =
            id_response(b"(\"name\" \"Cyrus\" \"version\" \"1.5\" \"os\" NIL)\r\n").unwrap();
        assert_eq!(
            parsed,
            Some(vec![
                ("name".into(), "Cyrus".into()),
                ("version".into(), "1.5".into()),
                ("os".into(), String::new()),
            ])
        );
    }

    #[test]
    fn test_id_odd_list() {
        assert!(id_response(b"(\"name\")\r\n").is_err());
        assert!(id_response(b"whatever\r\n").is_err());
    }
}
