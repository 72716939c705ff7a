//! Minimal RFC 5322 header-field extraction.
//!
//! This is not a full message parser: it digests the handful of header
//! fields the client asks for via `BODY[HEADER.FIELDS (...)]` — the
//! threading identifiers and the mailing-list posting address — from a
//! block of raw header bytes.

/// The fields extracted from one `HEADER.FIELDS` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderFields {
    pub references: Vec<String>,
    pub in_reply_to: Vec<String>,
    pub message_id: Vec<String>,
    /// URLs from `List-Post:`, angle brackets stripped.
    pub list_post: Vec<String>,
    /// `List-Post: NO` — the list does not accept posting.
    pub list_post_no: bool,
}

/// Parse a block of header lines.
///
/// Unknown fields are skipped; folding whitespace is unfolded; parsing never
/// fails, it just extracts less.
pub fn parse_header_fields(data: &[u8]) -> HeaderFields {
    let mut fields = HeaderFields::default();

    for (name, value) in unfolded_fields(data) {
        if name.eq_ignore_ascii_case(b"References") {
            fields.references.extend(angle_bracketed(&value));
        } else if name.eq_ignore_ascii_case(b"In-Reply-To") {
            fields.in_reply_to.extend(angle_bracketed(&value));
        } else if name.eq_ignore_ascii_case(b"Message-Id") {
            let ids = angle_bracketed(&value);
            // a Message-Id with several ids is invalid; take none then
            if ids.len() == 1 {
                fields.message_id.extend(ids);
            }
        } else if name.eq_ignore_ascii_case(b"List-Post") {
            let urls = angle_bracketed(&value);
            if urls.is_empty() && value.trim().eq_ignore_ascii_case("NO") {
                fields.list_post_no = true;
            } else {
                fields.list_post.extend(urls);
            }
        }
    }

    fields
}

/// All `<...>` message-ids found in a raw header value, e.g. the content of
/// an envelope's `In-Reply-To`.
pub fn parse_message_ids(data: &[u8]) -> Vec<String> {
    angle_bracketed(&String::from_utf8_lossy(data))
}

fn angle_bracketed(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = value;

    while let Some(open) = rest.find('<') {
        let Some(close) = rest[open + 1..].find('>') else {
            break;
        };
        let id: String = rest[open + 1..open + 1 + close]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if !id.is_empty() {
            out.push(id);
        }
        rest = &rest[open + 1 + close + 1..];
    }

    out
}

/// Split raw header bytes into `(name, unfolded value)` pairs.
fn unfolded_fields(data: &[u8]) -> Vec<(Vec<u8>, String)> {
    let mut out: Vec<(Vec<u8>, String)> = Vec::new();

    for line in data.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            // end of the header block
            break;
        }

        if line[0] == b' ' || line[0] == b'\t' {
            // continuation of the previous field
            if let Some((_, value)) = out.last_mut() {
                value.push(' ');
                value.push_str(String::from_utf8_lossy(line).trim());
            }
            continue;
        }

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let name = line[..colon].trim_ascii().to_vec();
        let value = String::from_utf8_lossy(&line[colon + 1..])
            .trim()
            .to_string();
        out.push((name, value));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_folded() {
        let hdr = b"References: <a@example.org>\r\n <b@example.org>\r\n\t<c@example.org>\r\n\r\n";
        let fields = parse_header_fields(hdr);
        assert_eq!(
            fields.references,
            vec!["a@example.org", "b@example.org", "c@example.org"]
        );
    }

    #[test]
    fn test_list_post() {
        let fields = parse_header_fields(b"List-Post: <mailto:dev@lists.example.org>\r\n");
        assert_eq!(fields.list_post, vec!["mailto:dev@lists.example.org"]);
        assert!(!fields.list_post_no);

        let fields = parse_header_fields(b"List-Post: NO\r\n");
        assert!(fields.list_post.is_empty());
        assert!(fields.list_post_no);
    }

    #[test]
    fn test_message_id_multiple_is_invalid() {
        let fields = parse_header_fields(b"Message-Id: <a@x> <b@x>\r\n");
        assert!(fields.message_id.is_empty());

        let fields = parse_header_fields(b"Message-ID: <a@x>\r\n");
        assert_eq!(fields.message_id, vec!["a@x"]);
    }

    #[test]
    fn test_mixed_and_unknown_fields() {
        let hdr = b"Subject: hi\r\nIn-Reply-To: <parent@x>\r\nX-Whatever: <ignored@x>\r\nReferences: <r1@x>\r\n\r\nbody <nope@x>";
        let fields = parse_header_fields(hdr);
        assert_eq!(fields.in_reply_to, vec!["parent@x"]);
        assert_eq!(fields.references, vec!["r1@x"]);
    }

    #[test]
    fn test_parse_message_ids() {
        assert_eq!(
            parse_message_ids(b"<one@x>   junk <two@y>"),
            vec!["one@x", "two@y"]
        );
        assert!(parse_message_ids(b"no ids here").is_empty());
    }
}
