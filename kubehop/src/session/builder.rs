//! Builder for creating remote sessions.

use std::sync::Arc;

use super::remote::RemoteSession;
use super::{NullSink, OutputSink, SessionState};
use crate::channel::{PromptDetector, PromptPatterns};
use crate::config::{Config, HostChain, SshSettings, Timeouts};
use crate::error::Result;
use crate::transport::{Connector, SshConnector};

/// Builder for constructing a [`RemoteSession`].
///
/// # Example
///
/// ```rust,no_run
/// use kubehop::SessionBuilder;
///
/// # async fn example() -> Result<(), kubehop::Error> {
/// let mut session = SessionBuilder::new()
///     .jump_host("usejump")
///     .internal_host("10.0.34.231")
///     .service_account("deployer")
///     .output_sink(|text: &str| print!("{}", text))
///     .build()?;
///
/// session.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    chain: HostChain,
    timeouts: Timeouts,
    ssh: SshSettings,
    connector: Option<Arc<dyn Connector>>,
    detector: Option<Arc<dyn PromptDetector>>,
    sink: Option<Arc<dyn OutputSink>>,
}

impl SessionBuilder {
    /// Create a builder with the default host chain and timeouts.
    pub fn new() -> Self {
        Self {
            chain: HostChain::default(),
            timeouts: Timeouts::default(),
            ssh: SshSettings::default(),
            connector: None,
            detector: None,
            sink: None,
        }
    }

    /// Start from the chain, SSH settings and timeouts of `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chain: config.chain.clone(),
            timeouts: config.timeouts.clone(),
            ssh: config.ssh.clone(),
            ..Self::new()
        }
    }

    /// Set the jump host (an alias in the SSH config).
    pub fn jump_host(mut self, host: impl Into<String>) -> Self {
        self.chain.jump_host = host.into();
        self
    }

    /// Set the host reached with `ssh` from the jump host.
    pub fn internal_host(mut self, host: impl Into<String>) -> Self {
        self.chain.internal_host = host.into();
        self
    }

    /// Set the account switched to with `sudo su -`.
    pub fn service_account(mut self, account: impl Into<String>) -> Self {
        self.chain.service_account = account.into();
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// SSH settings for the default connector.
    pub fn ssh_settings(mut self, ssh: SshSettings) -> Self {
        self.ssh = ssh;
        self
    }

    /// Use a custom connector instead of [`SshConnector`].
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom prompt detector.
    pub fn prompt_detector(mut self, detector: Arc<dyn PromptDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Use custom prompt regexes instead of the defaults.
    pub fn prompt_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        self.detector = Some(Arc::new(PromptPatterns::new(patterns)?));
        Ok(self)
    }

    /// Where progress text goes (default: nowhere).
    pub fn output_sink<S: OutputSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Share an existing sink.
    pub fn shared_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the session.
    ///
    /// This validates the host chain but does not connect. Call
    /// [`RemoteSession::connect`] on the result.
    pub fn build(self) -> Result<RemoteSession> {
        self.chain.validate()?;

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(SshConnector::new(self.ssh)));

        Ok(RemoteSession {
            chain: self.chain,
            timeouts: self.timeouts,
            connector,
            detector: self
                .detector
                .unwrap_or_else(|| Arc::new(PromptPatterns::default())),
            sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
            channel: None,
            state: SessionState::Disconnected,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
