//! Background task dispatch.
//!
//! [`TaskDispatcher`] runs each [`Action`] on its own tokio task and reports
//! results as [`TaskEvent`]s. It owns three sessions: the primary one for
//! connect and one-shot commands, one for log streaming and one for metrics
//! polling, so the two long-running tasks never share a channel.
//!
//! ```rust,no_run
//! use kubehop::{Action, Config, TaskDispatcher, TaskEvent};
//!
//! # async fn example() -> Result<(), kubehop::Error> {
//! let (dispatcher, mut events) = TaskDispatcher::new(Config::from_env()?)?;
//! dispatcher.dispatch(Action::Connect);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         TaskEvent::Connected => break,
//!         TaskEvent::Error(message) => eprintln!("{}", message),
//!         other => print!("{}", other),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod event;
mod metrics;
mod task;

pub use event::{EventStream, TaskEvent};
pub use metrics::MetricsProbe;
pub use task::{STOP_POLL_INTERVAL, StopFlag, TaskHandle, TaskState, sleep_unless_stopped};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::FutureExt;
use log::{error, info, warn};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};

use event::{EventSender, event_channel};
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::kube::{KubeOperations, parse_pod_names};
use crate::sanitize::PodName;
use crate::session::{NullSink, OutputSink, RemoteSession, SessionBuilder, StreamOutcome};
use crate::transport::{Connector, SshConnector};

/// How long disconnect waits for running tasks before aborting them.
pub const STOP_GRACE: Duration = Duration::from_secs(2);

/// Operations the dispatcher can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Connect the primary session and list running pods.
    Connect,
    /// List all running pods.
    ListAllPods,
    /// List pods whose listing line matches `keyword`.
    ListPods { keyword: String },
    Describe { pod: String },
    /// Follow a pod's logs until stopped.
    StreamLogs { pod: String },
    /// Poll a pod's CPU and memory until stopped.
    PollMetrics { pod: String },
    StopLogs,
    StopMetrics,
    /// Stop everything and close all sessions.
    Disconnect,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Connect => "connect",
            Action::ListAllPods => "list_all_pods",
            Action::ListPods { .. } => "list_pods",
            Action::Describe { .. } => "describe",
            Action::StreamLogs { .. } => "logs",
            Action::PollMetrics { .. } => "metrics",
            Action::StopLogs => "stop_logs",
            Action::StopMetrics => "stop_metrics",
            Action::Disconnect => "disconnect",
        }
    }

    /// Prefix of the message reported when this action fails.
    fn failure_context(&self) -> &'static str {
        match self {
            Action::Connect => "Connection failed",
            Action::ListAllPods => "Failed to refresh pods",
            Action::ListPods { .. } => "Failed to list pods",
            Action::Describe { .. } => "Failed to get pod details",
            Action::StreamLogs { .. } => "Failed to stream logs",
            Action::PollMetrics { .. } => "Metrics unavailable",
            Action::StopLogs | Action::StopMetrics => "Failed to stop task",
            Action::Disconnect => "Disconnect failed",
        }
    }
}

/// A long-running task the dispatcher may have to stop.
struct ActiveTask {
    handle: TaskHandle,
    join: JoinHandle<()>,
}

struct Shared {
    config: Config,
    events: EventSender,
    primary: Mutex<RemoteSession>,
    logs: Mutex<RemoteSession>,
    metrics: Mutex<RemoteSession>,
    log_task: StdMutex<Option<ActiveTask>>,
    metrics_task: StdMutex<Option<ActiveTask>>,
}

/// Runs actions in the background and reports through an [`EventStream`].
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct TaskDispatcher {
    shared: Arc<Shared>,
}

impl TaskDispatcher {
    /// Create a dispatcher connecting over SSH.
    pub fn new(config: Config) -> Result<(Self, EventStream)> {
        let connector = Arc::new(SshConnector::new(config.ssh.clone()));
        Self::with_connector(config, connector)
    }

    /// Create a dispatcher using `connector` for every session.
    pub fn with_connector(
        config: Config,
        connector: Arc<dyn Connector>,
    ) -> Result<(Self, EventStream)> {
        config.validate()?;
        let (events, stream) = event_channel();

        let console: Arc<dyn OutputSink> = {
            let events = events.clone();
            Arc::new(move |text: &str| events.output(text))
        };
        let session = |sink: Arc<dyn OutputSink>| {
            SessionBuilder::from_config(&config)
                .connector(connector.clone())
                .shared_sink(sink)
                .build()
        };

        let primary = session(console.clone())?;
        let logs = session(console)?;
        let metrics = session(Arc::new(NullSink))?;

        let shared = Shared {
            events,
            primary: Mutex::new(primary),
            logs: Mutex::new(logs),
            metrics: Mutex::new(metrics),
            log_task: StdMutex::new(None),
            metrics_task: StdMutex::new(None),
            config,
        };
        Ok((
            Self {
                shared: Arc::new(shared),
            },
            stream,
        ))
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Whether the primary session is connected.
    pub async fn is_connected(&self) -> bool {
        self.shared.primary.lock().await.is_connected()
    }

    /// Start `action` in the background.
    ///
    /// Starting a log stream or metrics poll first stops the one already
    /// running.
    pub fn dispatch(&self, action: Action) -> TaskHandle {
        let name = action.name();
        let stop = StopFlag::new();
        let (state_tx, state_rx) = watch::channel(TaskState::Idle);
        let handle = TaskHandle::new(name, stop.clone(), state_rx);
        info!("Dispatching task: {}", name);

        let slot = match action {
            Action::StreamLogs { .. } => Some(&self.shared.log_task),
            Action::PollMetrics { .. } => Some(&self.shared.metrics_task),
            _ => None,
        };
        if let Some(slot) = slot {
            stop_active(slot);
        }

        let shared = self.shared.clone();
        let join = tokio::spawn(async move {
            state_tx.send_replace(TaskState::Running);
            let context = action.failure_context();

            let outcome = AssertUnwindSafe(shared.run(action, &stop))
                .catch_unwind()
                .await;
            let state = match outcome {
                Ok(Ok(state)) => state,
                Ok(Err(e)) => {
                    error!("Task '{}' failed: {}", name, e);
                    shared.report(format!("{}: {}", context, e));
                    TaskState::Failed
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("Task '{}' panicked: {}", name, message);
                    shared.report(format!("Unexpected error in {} task: {}", name, message));
                    TaskState::Failed
                }
            };

            info!("Task '{}' finished: {}", name, state);
            state_tx.send_replace(state);
        });

        if let Some(slot) = slot
            && let Ok(mut active) = slot.lock()
        {
            *active = Some(ActiveTask {
                handle: handle.clone(),
                join,
            });
        }
        handle
    }
}

/// Stop the task in `slot`, if any, without waiting for it.
fn stop_active(slot: &StdMutex<Option<ActiveTask>>) {
    if let Ok(active) = slot.lock()
        && let Some(task) = active.as_ref()
        && !task.handle.is_finished()
    {
        info!("Stopping running {} task", task.handle.name());
        task.handle.stop();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Shared {
    async fn run(&self, action: Action, stop: &StopFlag) -> Result<TaskState> {
        match action {
            Action::Connect => self.connect().await,
            Action::ListAllPods => {
                let mut session = self.primary.lock().await;
                self.events.output("[INFO] Fetching all running pods...\n");
                self.list_all(&mut session).await?;
                Ok(TaskState::Completed)
            }
            Action::ListPods { keyword } => self.list_pods(&keyword).await,
            Action::Describe { pod } => self.describe(&pod).await,
            Action::StreamLogs { pod } => self.stream_logs(&pod, stop).await,
            Action::PollMetrics { pod } => self.poll_metrics(&pod, stop).await,
            Action::StopLogs => {
                stop_active(&self.log_task);
                Ok(TaskState::Completed)
            }
            Action::StopMetrics => {
                stop_active(&self.metrics_task);
                Ok(TaskState::Completed)
            }
            Action::Disconnect => self.disconnect().await,
        }
    }

    fn report(&self, message: String) {
        self.events.output(format!("[ERROR] {}\n", message));
        self.events.error(message);
    }

    async fn connect(&self) -> Result<TaskState> {
        let mut session = self.primary.lock().await;
        if session.is_connected() {
            info!("Already connected, skipping");
            self.events.output("[INFO] Already connected\n");
            self.events.send(TaskEvent::Connected);
            return Ok(TaskState::Completed);
        }

        session.connect().await?;

        self.events.output(format!(
            "\n[INFO] Listing all running pods in namespace '{}'...\n",
            self.config.kube.namespace
        ));
        if let Err(e) = self.list_all(&mut session).await {
            warn!("Failed to list pods after connecting: {}", e);
            self.events
                .output(format!("[WARNING] Could not list pods: {}\n", e));
        }

        self.events.send(TaskEvent::Connected);
        Ok(TaskState::Completed)
    }

    async fn list_all(&self, session: &mut RemoteSession) -> Result<()> {
        let mut ops = KubeOperations::new(session, &self.config.kube);
        self.events
            .output(format!("[CMD] {}\n", ops.running_pods_command()?));

        let output = ops.list_all_running().await?;
        self.events.output(output.as_str());
        if !output.ends_with('\n') {
            self.events.output("\n");
        }

        let pods = parse_pod_names(&output);
        if pods.is_empty() {
            self.events.output("[INFO] No running pods found\n");
        } else {
            self.events
                .output(format!("[OK] Found {} running pods\n", pods.len()));
        }
        self.events.send(TaskEvent::PodList(pods));
        Ok(())
    }

    async fn list_pods(&self, keyword: &str) -> Result<TaskState> {
        let mut session = self.primary.lock().await;
        let mut ops = KubeOperations::new(&mut session, &self.config.kube);
        self.events
            .output(format!("[CMD] {}\n", ops.matching_pods_command(keyword)?));

        let pods = ops.list_matching(keyword).await?;
        if pods.is_empty() {
            self.events
                .output(format!("[INFO] No pods found matching '{}'\n", keyword));
        } else {
            self.events.output(format!("[OK] Found {} pods\n", pods.len()));
        }
        self.events.send(TaskEvent::PodList(pods));
        Ok(TaskState::Completed)
    }

    async fn describe(&self, pod: &str) -> Result<TaskState> {
        let mut session = self.primary.lock().await;
        let mut ops = KubeOperations::new(&mut session, &self.config.kube);
        self.events
            .output(format!("[CMD] {}\n", ops.describe_command(pod)?));

        let details = ops.describe(pod).await?;
        self.events.output(details);
        Ok(TaskState::Completed)
    }

    async fn stream_logs(&self, pod: &str, stop: &StopFlag) -> Result<TaskState> {
        PodName::new(pod)?;
        self.require_connected().await?;
        let mut session = self.logs.lock().await;
        if stop.is_stopped() {
            return Ok(TaskState::Cancelled);
        }
        if !session.is_connected() {
            info!("Opening log session");
            session.connect().await?;
        }

        let tail = self.config.kube.log_tail_lines;
        let mut ops = KubeOperations::new(&mut session, &self.config.kube);
        self.events
            .output(format!("[CMD] {}\n", ops.logs_command(pod, true, tail)?));
        self.events
            .output("[INFO] Streaming logs... (select another pod to stop)\n\n");

        let events = self.events.clone();
        let outcome = ops
            .stream_logs(
                pod,
                true,
                tail,
                move |chunk: &str| events.output(chunk),
                || stop.is_stopped(),
            )
            .await?;

        self.events.output("\n[INFO] Log streaming stopped\n");
        Ok(match outcome {
            StreamOutcome::Cancelled => TaskState::Cancelled,
            StreamOutcome::Completed => TaskState::Completed,
        })
    }

    async fn poll_metrics(&self, pod: &str, stop: &StopFlag) -> Result<TaskState> {
        PodName::new(pod)?;
        self.require_connected().await?;
        let mut session = self.metrics.lock().await;
        if stop.is_stopped() {
            return Ok(TaskState::Cancelled);
        }
        if !session.is_connected() {
            info!("Opening metrics session");
            session.connect().await?;
        }

        let mut ops = KubeOperations::new(&mut session, &self.config.kube);
        let state =
            metrics::poll_metrics(&mut ops, pod, &self.config.metrics, stop, &self.events).await;
        Ok(state)
    }

    /// Long-running tasks open their own sessions only while the primary
    /// one is up.
    async fn require_connected(&self) -> Result<()> {
        if !self.primary.lock().await.is_connected() {
            return Err(SessionError::NotConnected.into());
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<TaskState> {
        info!("Handling disconnect");
        let deadline = Instant::now() + STOP_GRACE;
        for slot in [&self.log_task, &self.metrics_task] {
            let active = match slot.lock() {
                Ok(mut active) => active.take(),
                Err(_) => None,
            };
            if let Some(mut task) = active {
                task.handle.stop();
                if timeout_at(deadline, &mut task.join).await.is_err() {
                    warn!(
                        "{} task did not stop within {:?}, aborting",
                        task.handle.name(),
                        STOP_GRACE
                    );
                    task.join.abort();
                }
            }
        }

        for session in [&self.logs, &self.metrics, &self.primary] {
            session.lock().await.disconnect().await;
        }

        info!("Disconnected successfully");
        self.events.send(TaskEvent::Disconnected);
        Ok(TaskState::Completed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{FakeConnector, Reply, with_hops};

    fn cluster() -> Arc<FakeConnector> {
        FakeConnector::new(with_hops(|line| {
            if line.contains("--field-selector") {
                Reply::Output(
                    "NAME     READY   STATUS    RESTARTS   AGE\r\n\
                     web-1    1/1     Running   0          3d\r\n\
                     api-2    1/1     Running   0          1h"
                        .to_string(),
                )
            } else if line.contains("grep") {
                Reply::Output(String::new())
            } else if line.starts_with("kubectl top") {
                Reply::Output("NAME    CPU(cores)   MEMORY(bytes)\r\nweb-1   7m   80Mi".to_string())
            } else if line.starts_with("kubectl logs") {
                Reply::Follow {
                    prefix: "request served".to_string(),
                    every: Duration::from_millis(500),
                }
            } else if line.contains("boom") {
                panic!("remote exploded");
            } else {
                Reply::Output("Name: web-1".to_string())
            }
        }))
    }

    fn dispatcher(connector: Arc<FakeConnector>) -> (TaskDispatcher, EventStream) {
        TaskDispatcher::with_connector(Config::default(), connector).unwrap()
    }

    /// Collect events until one matches `done`.
    async fn events_until(
        events: &mut EventStream,
        done: impl Fn(&TaskEvent) -> bool,
    ) -> Vec<TaskEvent> {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(120), events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event stream closed");
            let last = done(&event);
            seen.push(event);
            if last {
                return seen;
            }
        }
    }

    fn output(events: &[TaskEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Output(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    async fn connect(dispatcher: &TaskDispatcher, events: &mut EventStream) -> Vec<TaskEvent> {
        let mut handle = dispatcher.dispatch(Action::Connect);
        let seen = events_until(events, |e| *e == TaskEvent::Connected).await;
        assert_eq!(handle.finished().await, TaskState::Completed);
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_lists_pods() {
        let (dispatcher, mut events) = dispatcher(cluster());
        let seen = connect(&dispatcher, &mut events).await;

        assert!(seen.contains(&TaskEvent::PodList(vec!["web-1".into(), "api-2".into()])));
        let text = output(&seen);
        assert!(text.contains("[SUCCESS] Connection established."));
        assert!(text.contains(
            "[CMD] kubectl get pods -n argo --field-selector=status.phase=Running\n"
        ));
        assert!(text.contains("[OK] Found 2 running pods\n"));
        assert!(dispatcher.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_when_connected() {
        let connector = cluster();
        let (dispatcher, mut events) = dispatcher(connector.clone());
        connect(&dispatcher, &mut events).await;

        let seen = connect(&dispatcher, &mut events).await;
        assert_eq!(
            seen,
            vec![
                TaskEvent::Output("[INFO] Already connected\n".into()),
                TaskEvent::Connected
            ]
        );
        assert_eq!(connector.shells().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_is_reported_not_retried() {
        let connector = cluster();
        connector.refuse(true);
        let (dispatcher, mut events) = dispatcher(connector.clone());

        let mut handle = dispatcher.dispatch(Action::Connect);
        let seen = events_until(&mut events, |e| matches!(e, TaskEvent::Error(_))).await;
        assert_eq!(handle.finished().await, TaskState::Failed);

        let TaskEvent::Error(message) = seen.last().unwrap() else {
            unreachable!()
        };
        assert!(message.starts_with("Connection failed: "));
        assert!(output(&seen).contains("[ERROR] Connection failed: "));
        assert!(connector.shells().is_empty());
        assert!(!seen.contains(&TaskEvent::Connected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_pods_requires_connection() {
        let (dispatcher, mut events) = dispatcher(cluster());
        dispatcher.dispatch(Action::ListPods {
            keyword: "web".into(),
        });
        let seen = events_until(&mut events, |e| matches!(e, TaskEvent::Error(_))).await;
        let TaskEvent::Error(message) = seen.last().unwrap() else {
            unreachable!()
        };
        assert!(message.starts_with("Failed to list pods: "));
        assert!(message.contains("Not connected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_pods_empty_result() {
        let (dispatcher, mut events) = dispatcher(cluster());
        connect(&dispatcher, &mut events).await;

        dispatcher.dispatch(Action::ListPods {
            keyword: "nothing".into(),
        });
        let seen = events_until(&mut events, |e| matches!(e, TaskEvent::PodList(_))).await;
        assert_eq!(seen.last(), Some(&TaskEvent::PodList(Vec::new())));
        assert!(output(&seen).contains("[INFO] No pods found matching 'nothing'\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logs_and_metrics_progress_independently() {
        let connector = cluster();
        let (dispatcher, mut events) = dispatcher(connector.clone());
        connect(&dispatcher, &mut events).await;

        let mut logs = dispatcher.dispatch(Action::StreamLogs { pod: "web-1".into() });
        let mut metrics = dispatcher.dispatch(Action::PollMetrics { pod: "web-1".into() });

        events_until(&mut events, |e| matches!(e, TaskEvent::Metrics(_))).await;
        events_until(&mut events, |e| {
            matches!(e, TaskEvent::Output(text) if text.contains("request served"))
        })
        .await;
        // Primary, log and metrics sessions.
        assert_eq!(connector.shells().len(), 3);

        dispatcher.dispatch(Action::StopMetrics);
        assert_eq!(metrics.finished().await, TaskState::Cancelled);
        assert_eq!(logs.state(), TaskState::Running);

        // The log stream keeps producing after metrics stopped.
        events_until(&mut events, |e| {
            matches!(e, TaskEvent::Output(text) if text.contains("request served"))
        })
        .await;
        assert_eq!(connector.shell(1).lock().unwrap().interrupts, 0);

        dispatcher.dispatch(Action::StopLogs);
        assert_eq!(logs.finished().await, TaskState::Cancelled);
        assert_eq!(connector.shell(1).lock().unwrap().interrupts, 1);
        assert!(connector.shell(1).lock().unwrap().open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_stream_stops_previous() {
        let connector = cluster();
        let (dispatcher, mut events) = dispatcher(connector.clone());
        connect(&dispatcher, &mut events).await;

        let mut first = dispatcher.dispatch(Action::StreamLogs { pod: "web-1".into() });
        events_until(&mut events, |e| {
            matches!(e, TaskEvent::Output(text) if text.contains("request served"))
        })
        .await;

        let second = dispatcher.dispatch(Action::StreamLogs { pod: "api-2".into() });
        assert_eq!(first.finished().await, TaskState::Cancelled);
        events_until(&mut events, |e| {
            matches!(e, TaskEvent::Output(text) if text.contains("kubectl logs 'api-2'"))
        })
        .await;
        assert!(!second.is_finished());
        // Both streams ran on the same log session.
        assert_eq!(connector.shells().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_twice() {
        let connector = cluster();
        let (dispatcher, mut events) = dispatcher(connector.clone());
        connect(&dispatcher, &mut events).await;
        let mut logs = dispatcher.dispatch(Action::StreamLogs { pod: "web-1".into() });
        events_until(&mut events, |e| {
            matches!(e, TaskEvent::Output(text) if text.contains("request served"))
        })
        .await;

        let mut first = dispatcher.dispatch(Action::Disconnect);
        let seen = events_until(&mut events, |e| *e == TaskEvent::Disconnected).await;
        assert_eq!(first.finished().await, TaskState::Completed);
        assert_eq!(logs.finished().await, TaskState::Cancelled);
        assert!(!seen.iter().any(|e| matches!(e, TaskEvent::Error(_))));
        assert!(connector.shells().iter().all(|s| s.lock().unwrap().closed));

        let mut second = dispatcher.dispatch(Action::Disconnect);
        let seen = events_until(&mut events, |e| *e == TaskEvent::Disconnected).await;
        assert_eq!(second.finished().await, TaskState::Completed);
        assert_eq!(seen, vec![TaskEvent::Disconnected]);
        assert!(!dispatcher.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_reported() {
        let (dispatcher, mut events) = dispatcher(cluster());
        connect(&dispatcher, &mut events).await;

        let mut handle = dispatcher.dispatch(Action::Describe { pod: "boom-1".into() });
        let seen = events_until(&mut events, |e| matches!(e, TaskEvent::Error(_))).await;
        assert_eq!(handle.finished().await, TaskState::Failed);
        let TaskEvent::Error(message) = seen.last().unwrap() else {
            unreachable!()
        };
        assert!(message.contains("remote exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_pod_is_rejected() {
        let connector = cluster();
        let (dispatcher, mut events) = dispatcher(connector.clone());
        connect(&dispatcher, &mut events).await;

        let mut handle = dispatcher.dispatch(Action::PollMetrics { pod: "--all".into() });
        let seen = events_until(&mut events, |e| matches!(e, TaskEvent::Error(_))).await;
        assert_eq!(handle.finished().await, TaskState::Failed);
        assert!(output(&seen).starts_with("[ERROR] Metrics unavailable: "));
        // Only the primary session was opened.
        assert_eq!(connector.shells().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_require_connection() {
        let connector = cluster();
        let (dispatcher, mut events) = dispatcher(connector.clone());

        let mut logs = dispatcher.dispatch(Action::StreamLogs { pod: "web-1".into() });
        let seen = events_until(&mut events, |e| matches!(e, TaskEvent::Error(_))).await;
        assert_eq!(logs.finished().await, TaskState::Failed);
        let TaskEvent::Error(message) = seen.last().unwrap() else {
            unreachable!()
        };
        assert!(message.starts_with("Failed to stream logs: "));
        assert!(message.contains("Not connected"));

        let mut metrics = dispatcher.dispatch(Action::PollMetrics { pod: "web-1".into() });
        let seen = events_until(&mut events, |e| matches!(e, TaskEvent::Error(_))).await;
        assert_eq!(metrics.finished().await, TaskState::Failed);
        assert_eq!(seen.iter().filter(|e| matches!(e, TaskEvent::Error(_))).count(), 1);
        assert!(connector.shells().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_rejected_after_disconnect() {
        let connector = cluster();
        let (dispatcher, mut events) = dispatcher(connector.clone());
        connect(&dispatcher, &mut events).await;
        dispatcher.dispatch(Action::Disconnect);
        events_until(&mut events, |e| *e == TaskEvent::Disconnected).await;

        let mut logs = dispatcher.dispatch(Action::StreamLogs { pod: "web-1".into() });
        events_until(&mut events, |e| matches!(e, TaskEvent::Error(_))).await;
        assert_eq!(logs.finished().await, TaskState::Failed);
        assert_eq!(connector.shells().len(), 1);
    }
}
