//! NAMESPACE (RFC 2342).

use crate::{
    core::{any, eat_spaces, Any},
    decode::{ParseErrorKind, ProtoParseError, ProtoResult},
};

/// One namespace entry: prefix plus hierarchy delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceRecord {
    pub prefix: String,
    /// Empty when the server reported `NIL` (a flat namespace).
    pub separator: String,
}

/// `* NAMESPACE` carries three NIL-or-list records: personal namespaces,
/// other users' namespaces, shared namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespaceResponse {
    pub personal: Vec<NamespaceRecord>,
    pub users: Vec<NamespaceRecord>,
    pub shared: Vec<NamespaceRecord>,
}

/// Parse the payload after `NAMESPACE `.
pub fn namespace(input: &[u8]) -> ProtoResult<'_, NamespaceResponse> {
    let (input, personal) = namespace_record(input)?;
    let (input, _) = eat_spaces(input)?;
    let (input, users) = namespace_record(input)?;
    let (input, _) = eat_spaces(input)?;
    let (input, shared) = namespace_record(input)?;

    Ok((
        input,
        NamespaceResponse {
            personal,
            users,
            shared,
        },
    ))
}

/// `nil / "(" 1*( "(" string SP (string / nil) *extension ")" ) ")"`
fn namespace_record(input: &[u8]) -> ProtoResult<'_, Vec<NamespaceRecord>> {
    let (remaining, value) = any(input)?;

    match value {
        Any::Nil => Ok((remaining, Vec::new())),
        Any::List(items) => {
            let mut records = Vec::new();
            for item in &items {
                let Some(fields) = item.as_list() else {
                    return Err(ProtoParseError::failure(
                        input,
                        ParseErrorKind::UnexpectedHere,
                    ));
                };
                if fields.len() < 2 {
                    return Err(ProtoParseError::failure(
                        input,
                        ParseErrorKind::UnexpectedHere,
                    ));
                }
                records.push(NamespaceRecord {
                    prefix: fields[0].to_text(),
                    separator: match &fields[1] {
                        Any::Nil => String::new(),
                        other => other.to_text(),
                    },
                });
            }
            Ok((remaining, records))
        }
        _ => Err(ProtoParseError::failure(
            input,
            ParseErrorKind::UnexpectedHere,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_simple() {
        let (_, parsed) = namespace(b"((\"\" \"/\")) NIL NIL\r\n").unwrap();
        assert_eq!(
            parsed.personal,
            vec![NamespaceRecord {
                prefix: String::new(),
                separator: "/".into(),
            }]
        );
        assert!(parsed.users.is_empty());
        assert!(parsed.shared.is_empty());
    }

    #[test]
    fn test_namespace_multiple() {
        let (_, parsed) = namespace(
            b"((\"\" \"/\")) ((\"~\" \"/\")) ((\"#shared/\" \"/\")(\"#public/\" \"/\"))\r\n",
        )
        .unwrap();
        assert_eq!(parsed.users[0].prefix, "~");
        assert_eq!(parsed.shared.len(), 2);
        assert_eq!(parsed.shared[1].prefix, "#public/");
    }

    #[test]
    fn test_namespace_garbage() {
        assert!(namespace(b"17 NIL NIL\r\n").is_err());
    }
}
