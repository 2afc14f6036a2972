//! Streaming command execution with cooperative cancellation.
//!
//! Output is handed to a callback as it arrives instead of being
//! accumulated. A follow-mode command never returns to the prompt, so the
//! caller ends it through `should_stop`: the loop then sends Ctrl-C, lets the
//! shell settle and drains what is left. When prompt completion is wanted,
//! a `BytesMut` window holding the last [`STREAM_WINDOW`] bytes is matched
//! instead of the whole output.

use bytes::{Buf, BytesMut};
use log::{debug, info, trace};
use tokio::time::{Instant, sleep};

use super::remote::RemoteSession;
use super::request::{StreamOptions, StreamOutcome};
use crate::channel::LossyDecoder;
use crate::error::{Result, SessionError};

/// Bytes of trailing output kept for prompt detection while streaming.
pub const STREAM_WINDOW: usize = 1024;

/// Ctrl-C.
const INTERRUPT: u8 = 0x03;

impl RemoteSession {
    /// Run a command that does not end on its own (e.g. `kubectl logs -f`).
    ///
    /// Each available piece of output is decoded and passed to `on_chunk`.
    /// `should_stop` is checked between reads, at least once per poll
    /// interval. Once it returns true the command is interrupted and this
    /// returns [`StreamOutcome::Cancelled`]; no chunk is delivered after
    /// that point.
    pub async fn execute_streaming<F, S>(
        &mut self,
        command: &str,
        on_chunk: F,
        should_stop: S,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&str) + Send,
        S: Fn() -> bool + Sync,
    {
        self.execute_streaming_with(command, StreamOptions::default(), on_chunk, should_stop)
            .await
    }

    /// [`execute_streaming`](Self::execute_streaming) with options.
    pub async fn execute_streaming_with<F, S>(
        &mut self,
        command: &str,
        options: StreamOptions,
        mut on_chunk: F,
        should_stop: S,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&str) + Send,
        S: Fn() -> bool + Sync,
    {
        self.ensure_ready()?;
        info!("Executing streaming command: {}", command);

        let result = self
            .stream_output(command, options, &mut on_chunk, &should_stop)
            .await;
        self.check_fatal(result).await
    }

    async fn stream_output<F, S>(
        &mut self,
        command: &str,
        options: StreamOptions,
        on_chunk: &mut F,
        should_stop: &S,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&str) + Send,
        S: Fn() -> bool + Sync,
    {
        self.send_line(command).await?;
        sleep(self.timeouts.stream_settle).await;

        let channel = self.channel.as_mut().ok_or(SessionError::NotConnected)?;
        let mut decoder = LossyDecoder::new();
        let mut window = BytesMut::with_capacity(STREAM_WINDOW * 2);
        let mut last_activity = Instant::now();
        let mut chunks = 0usize;
        let mut total = 0usize;

        loop {
            if should_stop() {
                info!("Stop requested, interrupting: {}", command);
                channel.send(&[INTERRUPT]).await?;
                sleep(self.timeouts.interrupt_drain).await;

                let mut drained = 0;
                while let Some(rest) = channel.try_read()? {
                    drained += rest.len();
                }
                debug!(
                    "Stream stopped after {} chunks ({} bytes), drained {} bytes",
                    chunks, total, drained
                );
                return Ok(StreamOutcome::Cancelled);
            }

            match channel.try_read()? {
                Some(chunk) if !chunk.is_empty() => {
                    chunks += 1;
                    total += chunk.len();
                    trace!("Chunk #{}: {} bytes (total: {})", chunks, chunk.len(), total);
                    last_activity = Instant::now();

                    if options.complete_on_prompt {
                        window.extend_from_slice(&chunk);
                        if window.len() > STREAM_WINDOW {
                            let excess = window.len() - STREAM_WINDOW;
                            window.advance(excess);
                        }
                    }

                    let text = decoder.decode(&chunk);
                    if !text.is_empty() {
                        on_chunk(&text);
                    }
                }
                _ => {
                    if options.complete_on_prompt
                        && last_activity.elapsed() > self.timeouts.idle_threshold
                        && self.detector.matches(&window)
                    {
                        let rest = decoder.flush();
                        if !rest.is_empty() {
                            on_chunk(&rest);
                        }
                        info!("Stream completed after {} chunks ({} bytes)", chunks, total);
                        return Ok(StreamOutcome::Completed);
                    }
                    sleep(self.timeouts.poll_interval).await;
                }
            }
        }
    }
}
