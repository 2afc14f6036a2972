//! Incremental lossy UTF-8 decoding for streamed output.
//!
//! Channel reads split the byte stream at arbitrary points, including in the
//! middle of a multi-byte character. The decoder holds back an incomplete
//! trailing sequence until the next chunk completes it; anything actually
//! invalid becomes U+FFFD. Decoding never fails.

use bytes::BytesMut;

#[derive(Debug, Default)]
pub struct LossyDecoder {
    pending: BytesMut,
}

impl LossyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, holding back an incomplete trailing character.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let keep = incomplete_suffix_len(&self.pending);
        let complete = self.pending.split_to(self.pending.len() - keep);
        String::from_utf8_lossy(&complete).into_owned()
    }

    /// Decode whatever is still held back.
    pub fn flush(&mut self) -> String {
        let rest = self.pending.split();
        String::from_utf8_lossy(&rest).into_owned()
    }

    /// Bytes held back waiting for the rest of a character.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Length of a trailing UTF-8 sequence that has started but not finished.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}
