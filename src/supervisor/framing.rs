//! Line framing over an unstructured byte stream.
//!
//! Child stdout arrives in arbitrary chunks: a JSON document may be split at
//! any byte offset, or several documents may land in one read. [`LineBuffer`]
//! reassembles `\n`-delimited lines across those boundaries, holding partial
//! trailing data until its delimiter arrives — never discarded, never
//! force-flushed.

use super::errors::McpError;

/// Reassembles newline-delimited lines from arbitrary byte chunks.
///
/// Buffered partial data is capped: a child that streams without ever
/// emitting a newline would otherwise grow the buffer without bound.
pub struct LineBuffer {
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl LineBuffer {
    /// Create a buffer that rejects lines longer than `max_line_bytes`.
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line_bytes,
        }
    }

    /// Append one chunk and extract every line it completed.
    ///
    /// Lines are returned without their trailing delimiter (a `\r` before
    /// the `\n` is stripped too) and decoded lossily. Errors when the
    /// undelimited remainder exceeds the configured cap; the buffer is
    /// cleared at that point since the stream can no longer be framed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, McpError> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let end = if pos > 0 && self.buf[pos - 1] == b'\r' {
                pos - 1
            } else {
                pos
            };
            lines.push(String::from_utf8_lossy(&self.buf[..end]).into_owned());
            self.buf.drain(..=pos);
        }

        if self.buf.len() > self.max_line_bytes {
            self.buf.clear();
            return Err(McpError::TransportError {
                reason: format!(
                    "line exceeded {} bytes without a newline",
                    self.max_line_bytes
                ),
            });
        }

        Ok(lines)
    }

    /// Bytes currently held waiting for a delimiter.
    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_line() {
        let mut buf = LineBuffer::new(1024);
        let lines = buf.push(b"{\"id\":1}\n").unwrap();
        assert_eq!(lines, vec!["{\"id\":1}"]);
        assert_eq!(buf.buffered_bytes(), 0);
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut buf = LineBuffer::new(1024);
        let lines = buf.push(b"first\nsecond\nthird\n").unwrap();
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_partial_line_is_retained() {
        let mut buf = LineBuffer::new(1024);
        assert!(buf.push(b"{\"id\":").unwrap().is_empty());
        assert_eq!(buf.buffered_bytes(), 6);

        let lines = buf.push(b"1}\n").unwrap();
        assert_eq!(lines, vec!["{\"id\":1}"]);
        assert_eq!(buf.buffered_bytes(), 0);
    }

    #[test]
    fn test_split_at_every_byte_offset() {
        let line = br#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#;
        let mut framed = line.to_vec();
        framed.push(b'\n');

        for split in 0..framed.len() {
            let mut buf = LineBuffer::new(1024);
            let mut lines = buf.push(&framed[..split]).unwrap();
            lines.extend(buf.push(&framed[split..]).unwrap());
            assert_eq!(lines.len(), 1, "split at {split}");
            assert_eq!(lines[0].as_bytes(), line);
        }
    }

    #[test]
    fn test_chunk_completing_and_starting_lines() {
        let mut buf = LineBuffer::new(1024);
        assert!(buf.push(b"par").unwrap().is_empty());
        let lines = buf.push(b"tial\nnext").unwrap();
        assert_eq!(lines, vec!["partial"]);
        assert_eq!(buf.buffered_bytes(), 4);
    }

    #[test]
    fn test_crlf_delimiter_stripped() {
        let mut buf = LineBuffer::new(1024);
        let lines = buf.push(b"{\"id\":1}\r\n").unwrap();
        assert_eq!(lines, vec!["{\"id\":1}"]);
    }

    #[test]
    fn test_empty_lines_are_preserved() {
        let mut buf = LineBuffer::new(1024);
        let lines = buf.push(b"\n\nx\n").unwrap();
        assert_eq!(lines, vec!["", "", "x"]);
    }

    #[test]
    fn test_oversized_line_is_rejected() {
        let mut buf = LineBuffer::new(8);
        let err = buf.push(b"0123456789abcdef").unwrap_err();
        assert!(matches!(err, McpError::TransportError { .. }));
        assert_eq!(buf.buffered_bytes(), 0);
    }

    #[test]
    fn test_oversized_check_ignores_completed_lines() {
        let mut buf = LineBuffer::new(8);
        let lines = buf.push(b"0123456789abcdef\n").unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut buf = LineBuffer::new(1024);
        let lines = buf.push(b"ok \xff\xfe bytes\n").unwrap();
        assert!(lines[0].contains("ok"));
        assert!(lines[0].contains("bytes"));
    }
}
