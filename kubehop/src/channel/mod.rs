//! Channel layer for prompt detection and output handling.
//!
//! This module handles what comes back from the interactive shell:
//! accumulating it, deciding when a prompt has returned, decoding streamed
//! chunks and stripping terminal escapes.

mod ansi;
mod buffer;
mod decode;
mod patterns;

pub use ansi::strip_ansi;
pub use buffer::{PromptBuffer, last_line};
pub use decode::LossyDecoder;
pub use patterns::{DEFAULT_PROMPT_PATTERNS, PromptDetector, PromptPatterns, compile_prompt_pattern};
