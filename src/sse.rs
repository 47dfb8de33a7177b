//! Incremental line framer for streamed response bodies.
//!
//! Handles:
//! - Partial lines across TCP chunks
//! - Multi-byte UTF-8 sequences split across chunks
//! - CRLF and LF line endings
//! - A trailing line without a newline at end of input

use bytes::{Bytes, BytesMut};
use memchr::memchr;

/// Prefix carried by every payload line.
pub const DATA_PREFIX: &str = "data:";

/// Literal payload terminating chat-completion streams.
pub const DONE_MARKER: &str = "[DONE]";

/// Splits a byte stream into complete lines without copying line contents.
pub struct LineBuffer {
    buffer: BytesMut,
}

impl LineBuffer {
    /// Create a new buffer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    /// Create a new buffer with specified initial capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(cap),
        }
    }

    /// Feed bytes into the buffer. Zero-length reads are a no-op.
    #[inline]
    pub fn feed(&mut self, data: &[u8]) {
        if !data.is_empty() {
            self.buffer.extend_from_slice(data);
        }
    }

    /// Take the next complete line, without its line ending.
    /// Returns `None` if more data is needed.
    pub fn next_line(&mut self) -> Option<Bytes> {
        let end = memchr(b'\n', &self.buffer)?;
        let mut line = self.buffer.split_to(end + 1);
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }
        Some(line.freeze())
    }

    /// Take whatever remains once the input has ended.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = self.buffer.split();
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(line.freeze())
    }

    /// Bytes buffered but not yet returned as a line.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discard buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload of a `data:` line, with the optional leading space removed.
#[inline]
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(DATA_PREFIX)?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Check if a payload is the stream terminator.
#[inline]
pub fn is_done(payload: &str) -> bool {
    payload.trim() == DONE_MARKER
}
