//! Command request and streaming result types.

use std::time::Duration;

/// A command to run in the elevated shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Command text, without the trailing newline.
    pub text: String,

    /// How long to wait for the prompt to return.
    pub timeout: Duration,

    /// Whether the output should be delivered incrementally.
    pub streaming: bool,
}

impl CommandRequest {
    /// A command whose whole output is returned once the prompt is back.
    pub fn one_shot(text: impl Into<String>, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            timeout,
            streaming: false,
        }
    }

    /// A command whose output is delivered as it arrives.
    pub fn streaming(text: impl Into<String>, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            timeout,
            streaming: true,
        }
    }
}

/// How a streaming command ended.
///
/// Failures are reported through the `Err` arm instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The prompt came back on its own.
    Completed,

    /// The caller asked to stop and the command was interrupted.
    Cancelled,
}

/// Options for [`RemoteSession::execute_streaming_with`](super::RemoteSession::execute_streaming_with).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// End the stream when the prompt reappears after the idle threshold.
    ///
    /// Off for follow-mode commands, which only end when stopped.
    pub complete_on_prompt: bool,
}

impl StreamOptions {
    pub fn complete_on_prompt() -> Self {
        Self {
            complete_on_prompt: true,
        }
    }
}
