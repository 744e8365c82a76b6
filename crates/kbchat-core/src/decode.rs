//! Incremental line decoding for the streaming response body.
//!
//! Chunks arrive at arbitrary byte boundaries: a chunk may end in the
//! middle of a line or in the middle of a multi-byte UTF-8 sequence. The
//! decoder buffers raw bytes and only splits at `\n`, which cannot occur
//! inside a multi-byte sequence, so partial characters are carried across
//! pushes untouched. Invalid UTF-8 degrades to replacement characters.

/// Buffers byte chunks and yields complete text lines in arrival order.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and drain every complete line it closes.
    ///
    /// A line is complete once its `\n` terminator has arrived; the
    /// terminator (and a preceding `\r`, if any) is stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            let mut line = &self.buf[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
        }
        self.buf.drain(..start);
        lines
    }

    /// End of stream. An unterminated remainder cannot form a valid event
    /// and is dropped.
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buf).into_owned())
        }
    }

    /// Bytes currently held for an incomplete line.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}
