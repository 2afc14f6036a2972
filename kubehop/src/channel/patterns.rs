//! Prompt detection.
//!
//! Nested interactive shells give no end-of-command marker, so completion is
//! inferred from the last line of output looking like a shell prompt. The
//! [`PromptDetector`] trait is the only thing the session depends on; a
//! sentinel-based detector can replace [`PromptPatterns`] without touching
//! callers.

use regex::bytes::Regex;

use super::buffer::last_line;
use crate::error::ChannelError;

/// Prompt patterns used when none are configured, tried in order.
pub const DEFAULT_PROMPT_PATTERNS: &[&str] = &[
    r"[$#]\s*$", // bash/sh prompt ending with $ or #
    r"]\$\s*$",  // [user@host dir]$
    r">\s*$",    // bare > prompt
];

/// Decides whether accumulated output ends with a prompt.
pub trait PromptDetector: Send + Sync {
    /// Whether `buffer` ends in a prompt.
    fn matches(&self, buffer: &[u8]) -> bool;
}

/// Ordered regexes matched against the last non-blank line only.
#[derive(Debug, Clone)]
pub struct PromptPatterns {
    patterns: Vec<Regex>,
}

impl PromptPatterns {
    /// Compile `patterns`, anchoring each to the end of the line if needed.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ChannelError> {
        let patterns = patterns
            .iter()
            .map(|p| compile_prompt_pattern(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether a single line looks like a prompt.
    pub fn is_prompt_line(&self, line: &[u8]) -> bool {
        self.patterns.iter().any(|p| p.is_match(line))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for PromptPatterns {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PROMPT_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("built-in prompt pattern is valid"))
                .collect(),
        }
    }
}

impl PromptDetector for PromptPatterns {
    fn matches(&self, buffer: &[u8]) -> bool {
        self.is_prompt_line(last_line(buffer))
    }
}

/// Compile a prompt pattern string into a regex.
///
/// Anchors to end of string if no anchor is given.
pub fn compile_prompt_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let pattern = if pattern.ends_with('$') && !pattern.ends_with("\\$") {
        pattern.to_string()
    } else {
        format!("{}\\s*$", pattern)
    };

    Regex::new(&pattern)
}
