//! URLAUTH (RFC 4467): the `* GENURLAUTH` response.

use crate::{core::astring, decode::ProtoResult};

/// Parse the payload after `GENURLAUTH `: one authorized URL.
pub fn genurlauth(input: &[u8]) -> ProtoResult<'_, String> {
    let (remaining, (url, _)) = astring(input)?;

    Ok((remaining, String::from_utf8_lossy(&url).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genurlauth() {
        let (_, url) = genurlauth(
            b"\"imap://joe@example.com/INBOX/;uid=20;urlauth=anonymous:internal:91354a4\"\r\n",
        )
        .unwrap();
        assert!(url.starts_with("imap://joe@example.com/"));
    }
}
