//! Frame assembly: raw socket bytes in, complete response lines out.
//!
//! A "frame" is one full server response, CRLF-terminated, with every
//! announced literal's content included verbatim. The response parser
//! relies on receiving exactly that.
//!
//! A line ending in `{n}\r\n` (or `{n+}\r\n`) announces `n` literal octets
//! that belong to the same response; the logical line continues after them.

use bytes::{Buf, BytesMut};

/// Accumulates bytes and carves out complete response frames.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: BytesMut,
    /// Scan position within `buffer`: everything before it already belongs
    /// to the frame under construction.
    scan_pos: usize,
    /// Literal octets still missing before line scanning may resume.
    literal_remaining: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes currently buffered but not yet complete.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Extract the next complete frame, if any.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.literal_remaining > 0 {
                let available = self.buffer.len() - self.scan_pos;
                let consumed = available.min(self.literal_remaining);
                self.scan_pos += consumed;
                self.literal_remaining -= consumed;
                if self.literal_remaining > 0 {
                    return None;
                }
            }

            let newline = self.buffer[self.scan_pos..]
                .iter()
                .position(|&b| b == b'\n')?;
            let line_end = self.scan_pos + newline + 1;

            match literal_announcement(&self.buffer[..line_end]) {
                Some(length) => {
                    self.scan_pos = line_end;
                    self.literal_remaining = length;
                }
                None => {
                    let frame = self.buffer.copy_to_bytes(line_end).to_vec();
                    self.scan_pos = 0;
                    return Some(frame);
                }
            }
        }
    }

    /// Drop everything buffered (connection teardown).
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scan_pos = 0;
        self.literal_remaining = 0;
    }
}

/// Does this line end with a literal announcement `{n[+]}\r\n`? Returns the
/// announced length.
fn literal_announcement(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\n")?;
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);

    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(b"* OK ready\r\na1 OK done\r\n");

        assert_eq!(assembler.next_frame().unwrap(), b"* OK ready\r\n");
        assert_eq!(assembler.next_frame().unwrap(), b"a1 OK done\r\n");
        assert!(assembler.next_frame().is_none());
    }

    #[test]
    fn test_split_feed() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(b"* 1 EXI");
        assert!(assembler.next_frame().is_none());
        assembler.feed(b"STS\r\n");
        assert_eq!(assembler.next_frame().unwrap(), b"* 1 EXISTS\r\n");
    }

    #[test]
    fn test_literal_spans_lines() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(b"* 1 FETCH (BODY[1] {11}\r\nhello\r\nwo)\r\n more)\r\n");

        // the CRLF inside the literal must not terminate the frame
        let frame = assembler.next_frame().unwrap();
        assert_eq!(
            frame,
            b"* 1 FETCH (BODY[1] {11}\r\nhello\r\nwo)\r\n more)\r\n".as_slice()
        );
    }

    #[test]
    fn test_literal_fed_in_pieces() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(b"* 1 FETCH (BODY[1] {5}\r\nab");
        assert!(assembler.next_frame().is_none());
        assembler.feed(b"cde)\r\n");
        assert_eq!(
            assembler.next_frame().unwrap(),
            b"* 1 FETCH (BODY[1] {5}\r\nabcde)\r\n".as_slice()
        );
    }

    #[test]
    fn test_nonsync_literal_announcement() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(b"* 1 FETCH (BODY[1] {3+}\r\nabc)\r\n");
        assert!(assembler.next_frame().is_some());
    }

    #[test]
    fn test_multiple_literals_one_frame() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(b"* 2 FETCH (BODY[1] {2}\r\nhi BODY[2] {2}\r\nyo)\r\n");
        let frame = assembler.next_frame().unwrap();
        assert!(frame.ends_with(b"yo)\r\n"));
        assert!(assembler.next_frame().is_none());
    }
}
