//! Periodic metrics polling with bounded retry.

use std::future::Future;

use log::{debug, info, warn};

use super::event::{EventSender, TaskEvent};
use super::task::{StopFlag, TaskState, sleep_unless_stopped};
use crate::config::MetricsPolicy;
use crate::error::{Error, KubeError, Result};
use crate::kube::{KubeOperations, MetricsSample};

/// One metrics query.
pub trait MetricsProbe: Send {
    fn sample(&mut self, pod: &str) -> impl Future<Output = Result<MetricsSample>> + Send;
}

impl MetricsProbe for KubeOperations<'_> {
    async fn sample(&mut self, pod: &str) -> Result<MetricsSample> {
        self.metrics(pod).await
    }
}

/// Poll `pod` until stopped or until failures exhaust `policy`.
///
/// Each failure ends the loop with exactly one `Error` event when it is
/// terminal: backend missing, pod missing, or too many consecutive
/// failures. A success resets the failure count.
pub(crate) async fn poll_metrics<P: MetricsProbe>(
    probe: &mut P,
    pod: &str,
    policy: &MetricsPolicy,
    stop: &StopFlag,
    events: &EventSender,
) -> TaskState {
    let max = policy.max_attempts;
    let mut failures = 0u32;
    info!("Metrics polling started for '{}'", pod);

    while !stop.is_stopped() {
        debug!("Fetching metrics for '{}' (attempt {})", pod, failures + 1);

        let err = match probe.sample(pod).await {
            Ok(sample) => {
                events.send(TaskEvent::Metrics(sample.to_string()));
                failures = 0;
                sleep_unless_stopped(policy.interval, stop).await;
                continue;
            }
            Err(e) => e,
        };

        failures += 1;
        warn!("Metrics fetch failed (attempt {}/{}): {}", failures, max, err);

        match &err {
            Error::Kube(KubeError::MetricsUnavailable { .. }) => {
                events.error("Metrics server not installed in cluster");
                return TaskState::Failed;
            }
            Error::Kube(KubeError::NotFound { pod }) => {
                events.error(format!("Pod '{}' not found - metrics polling stopped", pod));
                return TaskState::Failed;
            }
            Error::Kube(KubeError::MetricsNotReady { .. }) => {
                if failures >= max {
                    events.error("Pod is too new - metrics need ~60s to become available");
                    return TaskState::Failed;
                }
                events.send(TaskEvent::MetricsWaiting { attempt: failures, max });
                debug!(
                    "Pod too new, retrying in {:?} ({}/{})",
                    policy.not_ready_backoff, failures, max
                );
                sleep_unless_stopped(policy.not_ready_backoff, stop).await;
                continue;
            }
            _ => {}
        }

        if failures >= max {
            let message = if err.is_prompt_timeout() {
                format!("Metrics unavailable - command timed out after {} retries", max)
            } else {
                format!("Metrics unavailable after {} attempts", max)
            };
            events.error(message);
            return TaskState::Failed;
        }

        let delay = policy.backoff(failures);
        debug!("Retrying metrics fetch in {:?} ({}/{})", delay, failures, max);
        sleep_unless_stopped(delay, stop).await;
    }

    info!("Metrics polling for '{}' stopped", pod);
    TaskState::Cancelled
}
