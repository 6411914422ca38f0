// src/io/serial/framer.rs
//
// Newline framing for text records arriving over serial.
// Bytes are buffered until a `\n` arrives; complete lines are decoded
// permissively (invalid UTF-8 becomes U+FFFD) and blank lines are dropped.
// Framing happens on raw bytes so a multi-byte character split across reads
// still decodes correctly.

const LINE_DELIMITER: u8 = b'\n';

/// Default cap on an unterminated line before it is discarded
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Stateful line framer for streaming data.
pub struct LineFramer {
    /// Bytes received since the last delimiter
    buffer: Vec<u8>,
    max_line_length: usize,
    /// Set after an over-long run was dropped; bytes are skipped until the next delimiter
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineFramer {
    pub fn new(max_line_length: usize) -> Self {
        LineFramer {
            buffer: Vec::new(),
            max_line_length: max_line_length.max(1),
            discarding: false,
        }
    }

    /// Append a chunk to the buffer without extracting anything.
    /// Returns the number of bytes dropped because a line grew past the limit.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let mut data = data;
        let mut dropped = 0;

        if self.discarding {
            match data.iter().position(|&b| b == LINE_DELIMITER) {
                Some(pos) => {
                    dropped += pos + 1;
                    data = &data[pos + 1..];
                    self.discarding = false;
                }
                None => return data.len(),
            }
        }

        self.buffer.extend_from_slice(data);

        // Only the unterminated tail can overflow; complete lines are still extracted
        let tail_start = self
            .buffer
            .iter()
            .rposition(|&b| b == LINE_DELIMITER)
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let tail_len = self.buffer.len() - tail_start;
        if tail_len > self.max_line_length {
            self.buffer.truncate(tail_start);
            self.discarding = true;
            dropped += tail_len;
        }

        dropped
    }

    /// Extract the next non-blank line, if a complete one is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let end = self.buffer.iter().position(|&b| b == LINE_DELIMITER)?;
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let mut bytes = &raw[..end];
            if let Some(stripped) = bytes.strip_suffix(b"\r") {
                bytes = stripped;
            }
            let line = String::from_utf8_lossy(bytes);
            if line.trim().is_empty() {
                continue;
            }
            return Some(line.into_owned());
        }
    }

    /// Bytes held for the next chunk
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Push a chunk and drain every complete line
    fn drain_lines(framer: &mut LineFramer, data: &[u8]) -> Vec<String> {
        framer.push(data);
        std::iter::from_fn(|| framer.next_line()).collect()
    }

    #[test]
    fn test_line_framing() {
        let mut framer = LineFramer::default();

        let lines = drain_lines(&mut framer, b"10,20\n30,40\n");

        assert_eq!(lines, vec!["10,20", "30,40"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_partial_line_retained() {
        let mut framer = LineFramer::default();

        assert_eq!(drain_lines(&mut framer, b"12,3").len(), 0);
        assert_eq!(framer.pending(), b"12,3");

        let lines = drain_lines(&mut framer, b"4\n5,");
        assert_eq!(lines, vec!["12,34"]);
        assert_eq!(framer.pending(), b"5,");
    }

    #[test]
    fn test_crlf_stripped() {
        let mut framer = LineFramer::default();
        let lines = drain_lines(&mut framer, b"1,2\r\n3,4\r\n");
        assert_eq!(lines, vec!["1,2", "3,4"]);
    }

    #[test]
    fn test_blank_lines_dropped() {
        let mut framer = LineFramer::default();
        let lines = drain_lines(&mut framer, b"\n   \n\t\r\n7,8\n");
        assert_eq!(lines, vec!["7,8"]);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let mut framer = LineFramer::default();
        let lines = drain_lines(&mut framer, b"1,\xff,3\n");
        assert_eq!(lines, vec!["1,\u{FFFD},3"]);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut framer = LineFramer::default();
        let text = "21.5,°C\n".as_bytes();
        // Split inside the two-byte degree sign
        let split = text.iter().position(|&b| b == 0xC2).unwrap() + 1;

        assert_eq!(drain_lines(&mut framer, &text[..split]).len(), 0);
        let lines = drain_lines(&mut framer, &text[split..]);
        assert_eq!(lines, vec!["21.5,°C"]);
    }

    #[test]
    fn test_chunking_invariance() {
        let stream = b"1,2,3\n44,55\n6\n7,8,9,10\n11,1";
        let expected_lines = vec!["1,2,3", "44,55", "6", "7,8,9,10"];

        for chunk_size in 1..=stream.len() {
            let mut framer = LineFramer::default();
            let mut lines = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                lines.extend(drain_lines(&mut framer, chunk));
            }
            assert_eq!(lines, expected_lines, "chunk size {}", chunk_size);

            let mut rebuilt: Vec<u8> = lines.join("\n").into_bytes();
            rebuilt.push(b'\n');
            rebuilt.extend_from_slice(framer.pending());
            assert_eq!(rebuilt, stream.to_vec(), "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_overlong_line_discarded_until_delimiter() {
        let mut framer = LineFramer::new(4);

        assert_eq!(framer.push(b"1,2\n123456"), 6);
        assert_eq!(framer.next_line().as_deref(), Some("1,2"));
        assert!(framer.pending().is_empty());

        // Rest of the runaway line is skipped, the following line survives
        assert_eq!(framer.push(b"78\n9,9\n"), 3);
        assert_eq!(framer.next_line().as_deref(), Some("9,9"));
        assert_eq!(framer.next_line(), None);
    }
}
