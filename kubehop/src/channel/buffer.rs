//! Output accumulation for prompt detection.
//!
//! The whole command output is kept (callers want echo, result and prompt),
//! but prompt matching only ever looks at the last non-blank line, found by
//! scanning backwards with memchr.

use std::borrow::Cow;

use memchr::memrchr;

/// Growing buffer of raw shell output.
#[derive(Debug, Default)]
pub struct PromptBuffer {
    buffer: Vec<u8>,
}

impl PromptBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Append raw bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// The last non-blank line, without its line terminator.
    pub fn last_line(&self) -> &[u8] {
        last_line(&self.buffer)
    }

    /// The last `max_chars` characters, lossily decoded.
    pub fn tail(&self, max_chars: usize) -> String {
        let text = self.as_str_lossy();
        let count = text.chars().count();
        text.chars().skip(count.saturating_sub(max_chars)).collect()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the buffer contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Consume the buffer into a string (lossy UTF-8 conversion).
    pub fn into_string(self) -> String {
        match String::from_utf8(self.buffer) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

/// The last line of `data` that is not entirely whitespace.
///
/// A trailing `\r` is dropped. Returns an empty slice if every line is blank.
pub fn last_line(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    loop {
        let start = memrchr(b'\n', &data[..end]).map_or(0, |i| i + 1);
        let line = &data[start..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if !line.iter().all(u8::is_ascii_whitespace) {
            return line;
        }
        if start == 0 {
            return &data[..0];
        }
        end = start - 1;
    }
}
