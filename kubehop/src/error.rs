//! Error types for kubehop.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for kubehop operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Rejected caller input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Remote kubectl errors
    #[error("{0}")]
    Kube(#[from] KubeError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether this error means the channel or transport is unusable.
    ///
    /// A prompt timeout is not fatal: the remote may simply still be running.
    pub fn is_fatal_io(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Channel(ChannelError::Closed | ChannelError::Ssh(_))
        )
    }

    /// Whether this is a prompt timeout.
    pub fn is_prompt_timeout(&self) -> bool {
        matches!(self, Error::Channel(ChannelError::PromptTimeout { .. }))
    }
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not present in known_hosts and strict checking is on
    #[error("Host key for {host}:{port} is unknown (strict host key checking is enabled)")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (prompt detection, PTY operations).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The prompt did not appear before the deadline.
    ///
    /// `tail` holds the end of the buffered output so a hung remote can be
    /// told apart from a prompt that simply did not match.
    #[error("Timed out after {timeout:?} waiting for shell prompt; last output: {tail:?}")]
    PromptTimeout { timeout: Duration, tail: String },

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Session lifecycle errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session is not ready for commands
    #[error("Not connected - call connect() first")]
    NotConnected,
}

/// Caller input rejected by the sanitizer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Nothing left after filtering
    #[error("Invalid {what} - no valid characters in '{raw}'")]
    NoValidCharacters { what: &'static str, raw: String },

    /// Pod names must start and end with an alphanumeric character
    #[error("Invalid pod name '{name}' - must start and end with an alphanumeric character")]
    InvalidBoundary { name: String },

    /// Pod name longer than the Kubernetes limit
    #[error("Invalid pod name - {len} characters exceeds the limit of {max}")]
    TooLong { len: usize, max: usize },

    /// Configuration value contains characters outside the allow-list
    #[error("Invalid {what} '{raw}' - only [A-Za-z0-9_.-] is allowed")]
    DisallowedCharacters { what: &'static str, raw: String },
}

/// Errors reported by the remote kubectl invocation.
#[derive(Error, Debug)]
pub enum KubeError {
    /// The pod does not exist (any more)
    #[error("Pod '{pod}' not found")]
    NotFound { pod: String },

    /// Metrics are not collected yet; retrying later may succeed
    #[error("Pod too new - metrics not ready for '{pod}': {message}")]
    MetricsNotReady { pod: String, message: String },

    /// The cluster has no metrics backend
    #[error("Metrics server not available: {message}")]
    MetricsUnavailable { message: String },

    /// Output did not have the expected shape
    #[error("Failed to parse kubectl output: {message}")]
    Parse { message: String },
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Home directory could not be determined
    #[error("Failed to determine home directory")]
    NoHomeDir,

    /// Reading a configuration file failed
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Malformed SSH config line
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// No user configured for the jump host and none in the environment
    #[error("No user configured for host '{alias}'")]
    MissingUser { alias: String },

    /// A value failed to parse
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Result type alias using kubehop's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_timeout_message_includes_tail() {
        let err: Error = ChannelError::PromptTimeout {
            timeout: Duration::from_secs(5),
            tail: "still compiling...".into(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("5s"));
        assert!(msg.contains("still compiling..."));
        assert!(err.is_prompt_timeout());
        assert!(!err.is_fatal_io());
    }

    #[test]
    fn test_fatal_io_classification() {
        assert!(Error::from(ChannelError::Closed).is_fatal_io());
        assert!(Error::from(TransportError::Disconnected).is_fatal_io());
        assert!(!Error::from(SessionError::NotConnected).is_fatal_io());
    }
}
