//! Terminal escape sequence stripping, driven by the vte parser.

use vte::{Parser, Perform};

/// Collects printable characters and the whitespace controls that shape text.
struct PlainText {
    out: String,
}

impl Perform for PlainText {
    fn print(&mut self, c: char) {
        self.out.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.push(byte as char);
        }
    }
}

/// Remove color codes and other escape sequences from `text`.
pub fn strip_ansi(text: &str) -> String {
    let mut parser = Parser::new();
    let mut performer = PlainText {
        out: String::with_capacity(text.len()),
    };
    parser.advance(&mut performer, text.as_bytes());
    performer.out
}
