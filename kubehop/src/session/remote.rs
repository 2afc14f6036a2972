//! The hop-chain session and its prompt wait loop.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::time::{Instant, sleep};

use super::request::{CommandRequest, StreamOptions};
use super::{OutputSink, SessionState};
use crate::channel::{PromptBuffer, PromptDetector};
use crate::config::{HostChain, Timeouts};
use crate::error::{ChannelError, Result, SessionError};
use crate::transport::{Connector, ShellChannel};

/// Characters of output kept in a prompt timeout error.
const PROMPT_TAIL_CHARS: usize = 200;

/// One interactive shell walked through the host chain.
///
/// Every command method takes `&mut self`, so a session runs at most one
/// foreground command at a time. Share it between tasks behind an async
/// mutex.
pub struct RemoteSession {
    /// Hosts and account the connect sequence walks through.
    pub(super) chain: HostChain,

    pub(super) timeouts: Timeouts,

    /// Opens the shell on the jump host.
    pub(super) connector: Arc<dyn Connector>,

    /// Decides when the prompt has returned.
    pub(super) detector: Arc<dyn PromptDetector>,

    /// Receives progress text.
    pub(super) sink: Arc<dyn OutputSink>,

    /// The shell (None when disconnected).
    pub(super) channel: Option<Box<dyn ShellChannel>>,

    pub(super) state: SessionState,
}

impl RemoteSession {
    /// Walk the host chain: jump host shell, internal host, service account.
    ///
    /// Calling this on a ready session does nothing. On failure everything
    /// opened so far is closed, the state becomes [`SessionState::Error`]
    /// and `connect` may be called again.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            warn!("Already connected, skipping connection");
            return Ok(());
        }

        // A channel left over from a dead connection is closed first.
        self.teardown().await;
        self.state = SessionState::Connecting;
        info!("Starting SSH connection sequence");

        match self.establish().await {
            Ok(()) => {
                self.state = SessionState::Ready;
                info!("SSH connection chain established");
                self.emit("[SUCCESS] Connection established. Ready for kubectl commands.\n\n");
                Ok(())
            }
            Err(e) => {
                error!("Connection failed: {}", e);
                self.teardown().await;
                self.state = SessionState::Error;
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<()> {
        self.chain.validate()?;
        self.emit("[INFO] Initializing SSH connection...\n");

        let jump_host = self.chain.jump_host.clone();
        self.emit(&format!("[CMD] ssh {}\n", jump_host));
        info!("Step 1: connecting to jump host '{}'", jump_host);
        let channel = self.connector.open_shell(&jump_host).await?;
        self.channel = Some(channel);
        self.emit("[OK] Connected to jump host\n");

        self.wait_for_prompt(self.timeouts.initial_prompt).await?;
        debug!("Jump host prompt received");

        let chain = self.chain.clone();
        for (index, hop) in chain.hops().iter().enumerate() {
            let command = hop.command();
            info!("Step {}: {}", index + 2, command);
            self.emit(&format!("[CMD] {}\n", command));
            self.send_line(&command).await?;
            self.wait_for_prompt(hop.timeout(&self.timeouts)).await?;
            self.emit(&hop.done_message());
        }

        Ok(())
    }

    /// Close the shell and reset to [`SessionState::Disconnected`].
    ///
    /// Safe to call any number of times; close errors are only logged.
    pub async fn disconnect(&mut self) {
        if self.channel.is_some() {
            info!("Disconnecting from {}", self.chain.jump_host);
            self.emit("[INFO] Disconnecting...\n");
            self.teardown().await;
            self.emit("[OK] Disconnected\n");
        }
        self.state = SessionState::Disconnected;
    }

    /// Run `command` and return everything up to and including the prompt.
    ///
    /// The output contains the echoed command, its result and the trailing
    /// prompt line.
    pub async fn execute(&mut self, command: &str, timeout: Duration) -> Result<String> {
        self.ensure_ready()?;
        debug!("Executing command: {}", command);

        let result = match self.send_line(command).await {
            Ok(()) => self.wait_for_prompt(timeout).await,
            Err(e) => Err(e),
        };
        self.check_fatal(result).await
    }

    /// [`execute`](Self::execute) with the configured default command timeout.
    pub async fn send_command(&mut self, command: &str) -> Result<String> {
        self.execute(command, self.timeouts.command).await
    }

    /// Run a [`CommandRequest`].
    ///
    /// A streaming request is collected until the prompt returns, or
    /// interrupted once its timeout has passed.
    pub async fn execute_request(&mut self, request: &CommandRequest) -> Result<String> {
        if !request.streaming {
            return self.execute(&request.text, request.timeout).await;
        }

        let deadline = Instant::now() + request.timeout;
        let mut output = String::new();
        self.execute_streaming_with(
            &request.text,
            StreamOptions::complete_on_prompt(),
            |chunk: &str| output.push_str(chunk),
            || Instant::now() >= deadline,
        )
        .await?;
        Ok(output)
    }

    /// Whether the session is ready and its channel still open.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Ready && self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn chain(&self) -> &HostChain {
        &self.chain
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Accumulate output until the prompt shows up after a quiet period.
    ///
    /// Output counts as complete once nothing has arrived for the idle
    /// threshold and the last non-blank line matches the detector.
    pub(super) async fn wait_for_prompt(&mut self, timeout: Duration) -> Result<String> {
        let channel = self.channel.as_mut().ok_or(SessionError::NotConnected)?;
        let mut buffer = PromptBuffer::new();
        let start = Instant::now();
        let mut last_activity = start;

        loop {
            if start.elapsed() > timeout {
                let tail = buffer.tail(PROMPT_TAIL_CHARS);
                error!("Timeout waiting for prompt after {:?}", timeout);
                debug!("Buffer tail: {:?}", tail);
                return Err(ChannelError::PromptTimeout { timeout, tail }.into());
            }

            match channel.try_read()? {
                Some(chunk) if !chunk.is_empty() => {
                    buffer.extend(&chunk);
                    trace!("Read {} bytes (buffer: {})", chunk.len(), buffer.as_slice().len());
                    last_activity = Instant::now();
                }
                _ => {
                    if last_activity.elapsed() > self.timeouts.idle_threshold
                        && self.detector.matches(buffer.as_slice())
                    {
                        debug!(
                            "Prompt detected: {:?}",
                            String::from_utf8_lossy(buffer.last_line())
                        );
                        return Ok(buffer.into_string());
                    }
                    sleep(self.timeouts.poll_interval).await;
                }
            }
        }
    }

    pub(super) async fn send_line(&mut self, line: &str) -> Result<()> {
        let channel = self.channel.as_mut().ok_or(SessionError::NotConnected)?;
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        channel.send(&data).await
    }

    pub(super) fn ensure_ready(&self) -> Result<()> {
        if self.state != SessionState::Ready || self.channel.is_none() {
            return Err(SessionError::NotConnected.into());
        }
        Ok(())
    }

    /// Reset the session if `result` says the channel is gone.
    pub(super) async fn check_fatal<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.is_fatal_io()
        {
            error!("Channel lost, resetting session: {}", e);
            self.teardown().await;
            self.state = SessionState::Error;
        }
        result
    }

    pub(super) fn emit(&self, text: &str) {
        self.sink.on_text(text);
    }

    async fn teardown(&mut self) {
        if let Some(mut channel) = self.channel.take()
            && let Err(e) = channel.close().await
        {
            warn!("Error while closing channel: {}", e);
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if self.channel.is_some() {
            debug!("RemoteSession for {} dropped while connected", self.chain.jump_host);
        }
    }
}
