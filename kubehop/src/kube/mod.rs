//! Read-only Kubernetes operations over a [`RemoteSession`].
//!
//! [`KubeOperations`] borrows a connected session, builds kubectl commands
//! from sanitized input and turns the text that comes back into pod names,
//! metrics or plain output.

mod command;
mod parse;

pub use command::{KubectlCommand, Verb};
pub use parse::{MetricsSample, classify_metrics_error, parse_metrics, parse_pod_names};

use std::time::Duration;

use log::{debug, info};

use crate::channel::strip_ansi;
use crate::config::{KubeSettings, Timeouts};
use crate::error::Result;
use crate::sanitize::{PodName, SearchPattern};
use crate::session::{RemoteSession, StreamOptions, StreamOutcome};

/// Kubernetes operations issued through one session.
pub struct KubeOperations<'a> {
    session: &'a mut RemoteSession,
    settings: &'a KubeSettings,
    timeouts: Timeouts,
}

impl<'a> KubeOperations<'a> {
    pub fn new(session: &'a mut RemoteSession, settings: &'a KubeSettings) -> Self {
        let timeouts = session.timeouts().clone();
        Self {
            session,
            settings,
            timeouts,
        }
    }

    /// The command behind [`list_all_running`](Self::list_all_running).
    pub fn running_pods_command(&self) -> Result<KubectlCommand> {
        Ok(KubectlCommand::get_pods(&self.settings.namespace)?
            .flag("--field-selector=status.phase=Running"))
    }

    /// The command behind [`list_matching`](Self::list_matching).
    pub fn matching_pods_command(&self, keyword: &str) -> Result<KubectlCommand> {
        let pattern = SearchPattern::new(keyword)?;
        Ok(KubectlCommand::get_pods(&self.settings.namespace)?
            .flag("--no-headers")
            .grep(&pattern))
    }

    /// The command behind [`stream_logs`](Self::stream_logs).
    pub fn logs_command(
        &self,
        pod: &str,
        follow: bool,
        tail_lines: Option<u32>,
    ) -> Result<KubectlCommand> {
        let pod = PodName::new(pod)?;
        let mut command = KubectlCommand::logs(&pod, &self.settings.namespace)?;
        if follow {
            command = command.flag("-f");
        }
        if let Some(lines) = tail_lines {
            command = command.tail(lines);
        }
        Ok(command)
    }

    /// The command behind [`describe`](Self::describe).
    pub fn describe_command(&self, pod: &str) -> Result<KubectlCommand> {
        let pod = PodName::new(pod)?;
        KubectlCommand::describe_pod(&pod, &self.settings.namespace)
    }

    /// All running pods in the namespace, as kubectl printed them.
    pub async fn list_all_running(&mut self) -> Result<String> {
        info!("Listing all pods in namespace '{}'", self.settings.namespace);
        let command = self.running_pods_command()?;

        let output = self.run(&command, self.timeouts.listing).await?;
        Ok(strip_ansi(&output))
    }

    /// Names of the pods whose listing line matches `keyword`.
    pub async fn list_matching(&mut self, keyword: &str) -> Result<Vec<String>> {
        let command = self.matching_pods_command(keyword)?;
        info!("Listing pods with keyword '{}'", keyword);

        let output = self.run(&command, self.timeouts.listing).await?;
        let pods = parse_pod_names(&output);
        info!("Found {} pods matching '{}'", pods.len(), keyword);
        Ok(pods)
    }

    /// Stream the logs of `pod` into `on_chunk`.
    ///
    /// With `follow` the stream only ends through `should_stop`; without it,
    /// it also ends when the prompt returns.
    pub async fn stream_logs<F, S>(
        &mut self,
        pod: &str,
        follow: bool,
        tail_lines: Option<u32>,
        on_chunk: F,
        should_stop: S,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&str) + Send,
        S: Fn() -> bool + Sync,
    {
        let command = self.logs_command(pod, follow, tail_lines)?;
        info!("Streaming logs for pod '{}'", pod);

        let options = StreamOptions {
            complete_on_prompt: !follow,
        };
        let outcome = self
            .session
            .execute_streaming_with(&command.render(), options, on_chunk, should_stop)
            .await?;
        info!("Log streaming for '{}' ended: {:?}", pod, outcome);
        Ok(outcome)
    }

    /// `kubectl describe` output for `pod`.
    pub async fn describe(&mut self, pod: &str) -> Result<String> {
        let command = self.describe_command(pod)?;
        info!("Getting details for pod '{}'", pod);

        let output = self.run(&command, self.timeouts.listing).await?;
        info!("Retrieved pod details ({} bytes)", output.len());
        Ok(output)
    }

    /// Current CPU and memory usage of `pod`.
    pub async fn metrics(&mut self, pod: &str) -> Result<MetricsSample> {
        let pod = PodName::new(pod)?;
        let command = KubectlCommand::top_pod(&pod, &self.settings.namespace)?;

        let output = self.run(&command, self.timeouts.metrics_query).await?;
        let sample = parse_metrics(&output, &pod)?;
        debug!("Metrics for '{}': {}", pod, sample);
        Ok(sample)
    }

    async fn run(&mut self, command: &KubectlCommand, timeout: Duration) -> Result<String> {
        debug!("Executing: {}", command);
        self.session.execute_request(&command.request(timeout)).await
    }
}
