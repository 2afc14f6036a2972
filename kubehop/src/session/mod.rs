//! Interactive session through the host chain.
//!
//! A [`RemoteSession`] owns one shell channel that has been walked from the
//! jump host to the internal host and elevated to the service account.
//! Commands are typed into that shell and their completion is inferred from
//! the prompt coming back.

mod builder;
mod remote;
mod request;
mod stream;

pub use builder::SessionBuilder;
pub use remote::RemoteSession;
pub use request::{CommandRequest, StreamOptions, StreamOutcome};

/// Lifecycle of a [`RemoteSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    /// The last connect failed or the channel died; `connect()` may be retried.
    Error,
}

/// Receives the progress and output text a session produces.
///
/// Closures taking `&str` implement this trait.
pub trait OutputSink: Send + Sync {
    fn on_text(&self, text: &str);
}

impl<F> OutputSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_text(&self, text: &str) {
        self(text)
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn on_text(&self, _text: &str) {}
}
